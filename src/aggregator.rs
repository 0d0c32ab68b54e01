use std::collections::BTreeSet;

use hashbrown::HashMap;
use jiff::Timestamp;
use log::trace;

use crate::prefetch_record::{PrefetchRecord, PrefetchVersion};

/// Everything known about one executable, merged across all of its prefetch files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramAggregate {
    pub name: String,
    /// Highest run count seen in any of the program's prefetch files.
    pub run_count: u32,
    pub first_execution: Option<Timestamp>,
    pub last_execution: Option<Timestamp>,
    pub execution_times: BTreeSet<Timestamp>,
    /// Source files, in merge order.
    pub prefetch_files: Vec<String>,
    /// Format version of the first prefetch file seen for this program.
    pub version: PrefetchVersion,
}

impl ProgramAggregate {
    fn from_record(record: &PrefetchRecord) -> Self {
        let mut aggregate = ProgramAggregate {
            name: record.executable_name.clone(),
            run_count: record.run_count,
            first_execution: None,
            last_execution: None,
            execution_times: record.execution_times.iter().copied().collect(),
            prefetch_files: vec![record.filename.clone()],
            version: record.version,
        };
        aggregate.refresh_bounds();
        aggregate
    }

    fn merge(&mut self, record: &PrefetchRecord) {
        self.run_count = self.run_count.max(record.run_count);
        self.prefetch_files.push(record.filename.clone());
        self.execution_times.extend(record.execution_times.iter().copied());
        self.refresh_bounds();
    }

    fn refresh_bounds(&mut self) {
        self.first_execution = self.execution_times.first().copied();
        self.last_execution = self.execution_times.last().copied();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTimelineEntry {
    pub timestamp: Timestamp,
    pub executable_name: String,
    pub source_filename: String,
}

/// Merges parsed records into per-program aggregates and a flat execution timeline.
///
/// This is the only owner of the shared state, so records must be fed from a single thread.
#[derive(Debug, Default)]
pub struct Aggregator {
    programs: HashMap<String, ProgramAggregate>,
    timeline: Vec<ExecutionTimelineEntry>,
}

impl Aggregator {
    pub fn new() -> Self {
        Aggregator::default()
    }

    pub fn add_record(&mut self, record: &PrefetchRecord) {
        for &timestamp in &record.execution_times {
            self.timeline.push(ExecutionTimelineEntry {
                timestamp,
                executable_name: record.executable_name.clone(),
                source_filename: record.filename.clone(),
            });
        }

        match self.programs.get_mut(record.executable_name.as_str()) {
            Some(program) => {
                trace!(
                    "Merging {} into existing program {}",
                    record.filename,
                    record.executable_name
                );
                program.merge(record);
            }
            None => {
                self.programs.insert(
                    record.executable_name.clone(),
                    ProgramAggregate::from_record(record),
                );
            }
        }
    }

    pub fn programs(&self) -> &HashMap<String, ProgramAggregate> {
        &self.programs
    }

    /// Consumes the aggregator, returning the programs and the timeline sorted most recent first.
    pub fn finish(
        self,
    ) -> (
        HashMap<String, ProgramAggregate>,
        Vec<ExecutionTimelineEntry>,
    ) {
        let Aggregator {
            programs,
            mut timeline,
        } = self;
        timeline.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        (programs, timeline)
    }
}
