use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use log::{debug, info, warn};

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

use crate::aggregator::{Aggregator, ExecutionTimelineEntry, ProgramAggregate};
use crate::err::{AnalysisError, PrefetchError, Result};
use crate::lznt1::BackReferencePolicy;
use crate::mam;
use crate::prefetch_record::PrefetchRecord;
use crate::progress::{CancellationToken, ProgressCallback, ProgressTracker};
use crate::report::{AnalysisReport, Statistics};
use crate::source::{PrefetchSource, RawPrefetchFile};

/// Number of timeline entries emitted in reports unless configured otherwise.
pub const DEFAULT_TIMELINE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    num_threads: usize,
    back_reference_policy: BackReferencePolicy,
    timeline_limit: usize,
    indent: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        AnalyzerSettings {
            num_threads: 0,
            back_reference_policy: BackReferencePolicy::ZeroFill,
            timeline_limit: DEFAULT_TIMELINE_LIMIT,
            indent: true,
        }
    }
}

impl AnalyzerSettings {
    pub fn new() -> Self {
        AnalyzerSettings::default()
    }

    /// Sets the number of worker threads, `0` means use all available cores.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = if cfg!(feature = "multithreading") {
            num_threads
        } else {
            if num_threads != 1 {
                warn!(
                    "Multithreading was requested, but the library was compiled without `multithreading` feature! using fallback sync iterator"
                );
            }
            1
        };
        self
    }

    /// When set, a back-reference into data that was never produced fails the file instead of
    /// being zero filled.
    pub fn strict_decompression(mut self, strict: bool) -> Self {
        self.back_reference_policy = if strict {
            BackReferencePolicy::Strict
        } else {
            BackReferencePolicy::ZeroFill
        };
        self
    }

    /// Maximum number of timeline entries emitted in a report.
    pub fn timeline_limit(mut self, limit: usize) -> Self {
        self.timeline_limit = limit;
        self
    }

    pub fn indent(mut self, pretty: bool) -> Self {
        self.indent = pretty;
        self
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn get_back_reference_policy(&self) -> BackReferencePolicy {
        self.back_reference_policy
    }

    pub fn get_timeline_limit(&self) -> usize {
        self.timeline_limit
    }

    pub fn should_indent(&self) -> bool {
        self.indent
    }
}

/// Which step of the per-file pipeline failed.
enum FileFailure {
    /// The `MAM` container could not be unpacked.
    Decode(PrefetchError),
    Parse(PrefetchError),
}

fn decode_and_parse(
    filename: &str,
    data: &[u8],
    policy: BackReferencePolicy,
) -> std::result::Result<PrefetchRecord, FileFailure> {
    let decoded = mam::decode(filename, data, policy).map_err(FileFailure::Decode)?;
    PrefetchRecord::from_bytes(filename, &decoded).map_err(FileFailure::Parse)
}

/// Decodes (if needed) and parses a single prefetch file.
pub fn parse_prefetch_file(
    filename: &str,
    data: &[u8],
    policy: BackReferencePolicy,
) -> Result<PrefetchRecord> {
    decode_and_parse(filename, data, policy).map_err(|failure| match failure {
        FileFailure::Decode(e) | FileFailure::Parse(e) => e,
    })
}

/// What happened to one input file.
struct FileOutcome {
    filename: String,
    compressed: bool,
    /// A MAM container that could not be unpacked.
    decompression_failed: bool,
    result: Result<PrefetchRecord>,
}

impl FileOutcome {
    fn from_bytes(filename: String, data: &[u8], policy: BackReferencePolicy) -> Self {
        let compressed = mam::is_compressed(data);

        let (result, decompression_failed) = match decode_and_parse(&filename, data, policy) {
            Ok(record) => (Ok(record), false),
            Err(FileFailure::Decode(e)) => (Err(e), true),
            Err(FileFailure::Parse(e)) => (Err(e), false),
        };

        FileOutcome {
            filename,
            compressed,
            decompression_failed,
            result,
        }
    }
}

/// The outcome of an analysis run.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Successfully parsed records, in input order.
    pub records: Vec<PrefetchRecord>,
    pub programs: HashMap<String, ProgramAggregate>,
    /// Every execution of every record, most recent first.
    pub timeline: Vec<ExecutionTimelineEntry>,
    pub compressed_count: usize,
    /// Names of compressed files that failed to decompress.
    pub decompression_failures: Vec<String>,
    /// Every per-file failure, in input order.
    pub failures: Vec<PrefetchError>,
    /// Set if the run was cancelled before every file was processed.
    pub cancelled: bool,
}

impl AnalysisResult {
    pub fn statistics(&self) -> Statistics {
        Statistics {
            total_programs: self.programs.len(),
            total_prefetch_files: self.records.len(),
            compressed_files: self.compressed_count,
            decompression_failures: self.decompression_failures.len(),
            timeline_entries: self.timeline.len(),
        }
    }

    /// Builds the serializable report, keeping the `timeline_limit` most recent timeline entries.
    pub fn report(&self, timeline_limit: usize) -> AnalysisReport {
        AnalysisReport::new(self, timeline_limit)
    }
}

/// Runs the decode → parse → aggregate pipeline over a batch of prefetch files.
///
/// Files are decoded and parsed independently (in parallel with the `multithreading` feature),
/// then merged in input order on the calling thread.
pub struct PrefetchAnalyzer<'a> {
    settings: AnalyzerSettings,
    progress: Option<&'a dyn ProgressCallback>,
    cancellation: Option<CancellationToken>,
}

impl Default for PrefetchAnalyzer<'_> {
    fn default() -> Self {
        PrefetchAnalyzer::new()
    }
}

impl<'a> PrefetchAnalyzer<'a> {
    pub fn new() -> Self {
        PrefetchAnalyzer {
            settings: AnalyzerSettings::default(),
            progress: None,
            cancellation: None,
        }
    }

    pub fn with_configuration(mut self, configuration: AnalyzerSettings) -> Self {
        self.settings = configuration;
        self
    }

    pub fn with_progress(mut self, callback: &'a dyn ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Analyzes files that are already in memory.
    pub fn analyze(&self, files: &[RawPrefetchFile]) -> AnalysisResult {
        let policy = self.settings.back_reference_policy;
        self.run(
            files,
            |file| file.filename.clone(),
            |file, filename| FileOutcome::from_bytes(filename, &file.bytes, policy),
        )
    }

    /// Analyzes every file `source` enumerates.
    ///
    /// Only a failure to enumerate is returned as an error; unreadable files are recorded as
    /// [`PrefetchError::FileReadError`] in the result.
    pub fn analyze_source<S: PrefetchSource>(
        &self,
        source: &S,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let entries = source
            .enumerate()
            .map_err(|source| AnalysisError::Enumeration { source })?;
        info!("Found {} prefetch files", entries.len());

        let policy = self.settings.back_reference_policy;
        Ok(self.run(
            &entries,
            |entry| source.filename(entry),
            |entry, filename| match source.read(entry) {
                Ok(bytes) => FileOutcome::from_bytes(filename, &bytes, policy),
                Err(e) => FileOutcome {
                    result: Err(PrefetchError::FileReadError {
                        filename: filename.clone(),
                        source: e,
                    }),
                    filename,
                    compressed: false,
                    decompression_failed: false,
                },
            },
        ))
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn run<T, N, P>(&self, items: &[T], name_of: N, process: P) -> AnalysisResult
    where
        T: Sync,
        N: Fn(&T) -> String + Sync,
        P: Fn(&T, String) -> FileOutcome + Sync,
    {
        let tracker = ProgressTracker::new(self.progress);
        let total = items.len();

        if total == 0 {
            warn!("No prefetch files found");
        }
        tracker.update(0, &format!("Analyzing {} prefetch files...", total));

        let completed = AtomicUsize::new(0);
        let process_one = |item: &T| -> Option<FileOutcome> {
            if self.is_cancelled() {
                return None;
            }

            let filename = name_of(item);
            tracker.update(
                ProgressTracker::file_percent(completed.load(Ordering::Relaxed), total),
                &format!("Analyzing: {}", filename),
            );

            let outcome = process(item, filename);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            tracker.update(
                ProgressTracker::file_percent(done, total),
                &format!("Analyzed: {}", outcome.filename),
            );
            Some(outcome)
        };

        let outcomes = self.process_all(items, &process_one);
        let result = self.merge(outcomes, &tracker);

        let message = if total == 0 {
            "No prefetch files found".to_string()
        } else {
            format!(
                "Analysis complete! {} programs analyzed",
                result.programs.len()
            )
        };
        tracker.update(100, &message);

        result
    }

    #[cfg(feature = "multithreading")]
    fn process_all<T, F>(&self, items: &[T], process_one: &F) -> Vec<Option<FileOutcome>>
    where
        T: Sync,
        F: Fn(&T) -> Option<FileOutcome> + Sync,
    {
        if self.settings.num_threads == 1 || items.len() <= 1 {
            return items.iter().map(process_one).collect();
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.num_threads)
            .build()
        {
            Ok(pool) => pool.install(|| items.par_iter().map(process_one).collect()),
            Err(e) => {
                warn!(
                    "Failed to build thread pool ({}), falling back to a single thread",
                    e
                );
                items.iter().map(process_one).collect()
            }
        }
    }

    #[cfg(not(feature = "multithreading"))]
    fn process_all<T, F>(&self, items: &[T], process_one: &F) -> Vec<Option<FileOutcome>>
    where
        T: Sync,
        F: Fn(&T) -> Option<FileOutcome> + Sync,
    {
        items.iter().map(process_one).collect()
    }

    fn merge(
        &self,
        outcomes: Vec<Option<FileOutcome>>,
        tracker: &ProgressTracker<'_>,
    ) -> AnalysisResult {
        let mut aggregator = Aggregator::new();
        let mut result = AnalysisResult::default();

        for outcome in outcomes {
            let Some(outcome) = outcome else {
                result.cancelled = true;
                continue;
            };

            if outcome.compressed {
                result.compressed_count += 1;
            }

            if outcome.decompression_failed {
                result.decompression_failures.push(outcome.filename.clone());
            }

            match outcome.result {
                Ok(record) => {
                    aggregator.add_record(&record);
                    result.records.push(record);
                }
                Err(e) => {
                    warn!("Error parsing {}", e);
                    result.failures.push(e);
                }
            }
        }

        if result.cancelled {
            warn!(
                "Analysis cancelled, {} files were processed",
                result.records.len() + result.failures.len()
            );
        }

        tracker.update(70, "Building timeline...");
        let (programs, timeline) = aggregator.finish();
        result.programs = programs;
        result.timeline = timeline;

        info!("Prefetch analysis complete:");
        info!("  Total programs: {}", result.programs.len());
        info!("  Timeline entries: {}", result.timeline.len());
        info!("  Compressed files: {}", result.compressed_count);
        if !result.decompression_failures.is_empty() {
            warn!(
                "  Decompression failed: {}",
                result.decompression_failures.len()
            );
            debug!("  Failed files: {:?}", result.decompression_failures);
        }

        result
    }
}
