#![deny(unused_must_use)]
#![forbid(unsafe_code)]
//! Parser for Windows Prefetch (`.pf`) files.
//!
//! Handles the four on-disk layouts (versions 17, 23, 26 and 30), unpacks `MAM\x04`
//! compressed files, and merges many records into per-program statistics and an execution
//! timeline.
//!
//! ```no_run
//! use prefetch_timeline::{AnalyzerSettings, PathListSource, PrefetchAnalyzer};
//!
//! let source = PathListSource::new(["C:/Windows/Prefetch/CMD.EXE-4A81B364.pf"]);
//! let result = PrefetchAnalyzer::new()
//!     .with_configuration(AnalyzerSettings::new().num_threads(0))
//!     .analyze_source(&source)
//!     .unwrap();
//!
//! for (name, program) in &result.programs {
//!     println!("{}: {} runs, last at {:?}", name, program.run_count, program.last_execution);
//! }
//! ```

pub use aggregator::{Aggregator, ExecutionTimelineEntry, ProgramAggregate};
pub use analyzer::{
    AnalysisResult, AnalyzerSettings, DEFAULT_TIMELINE_LIMIT, PrefetchAnalyzer,
    parse_prefetch_file,
};
pub use err::{AnalysisError, DeserializationError, Lznt1Error, PrefetchError};
pub use lznt1::BackReferencePolicy;
pub use mam::MamContainer;
pub use prefetch_record::{PrefetchRecord, PrefetchVersion};
pub use progress::{CancellationToken, ProgressCallback};
pub use report::{AnalysisReport, FailureSummary, ProgramSummary, Statistics, TimelineEntry};
pub use source::{PathListSource, PrefetchSource, RawPrefetchFile};

pub mod aggregator;
pub mod analyzer;
pub mod err;
pub mod lznt1;
pub mod mam;
pub mod prefetch_record;
pub mod progress;
pub mod report;
pub mod source;
mod utils;

pub use utils::{filetime_to_execution_time, filetime_to_timestamp};

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Cargo runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
