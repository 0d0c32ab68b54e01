use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Serialize;

use crate::aggregator::{ExecutionTimelineEntry, ProgramAggregate};
use crate::analyzer::AnalysisResult;
use crate::prefetch_record::PrefetchVersion;

/// Counters describing an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_programs: usize,
    /// Files that produced a record.
    pub total_prefetch_files: usize,
    pub compressed_files: usize,
    pub decompression_failures: usize,
    /// All timeline entries, not only the ones emitted in a report.
    pub timeline_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramSummary {
    pub name: String,
    pub run_count: u32,
    pub last_execution: Option<Timestamp>,
    pub first_execution: Option<Timestamp>,
    /// Oldest first.
    pub execution_times: Vec<Timestamp>,
    pub prefetch_files: Vec<String>,
    pub version: PrefetchVersion,
}

impl From<&ProgramAggregate> for ProgramSummary {
    fn from(program: &ProgramAggregate) -> Self {
        ProgramSummary {
            name: program.name.clone(),
            run_count: program.run_count,
            last_execution: program.last_execution,
            first_execution: program.first_execution,
            execution_times: program.execution_times.iter().copied().collect(),
            prefetch_files: program.prefetch_files.clone(),
            version: program.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub timestamp: Timestamp,
    pub executable: String,
    pub prefetch_file: String,
}

impl From<&ExecutionTimelineEntry> for TimelineEntry {
    fn from(entry: &ExecutionTimelineEntry) -> Self {
        TimelineEntry {
            timestamp: entry.timestamp,
            executable: entry.executable_name.clone(),
            prefetch_file: entry.source_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub filename: String,
    pub error: String,
}

/// The JSON-facing view of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub programs: BTreeMap<String, ProgramSummary>,
    /// The most recent entries, most recent first.
    pub timeline: Vec<TimelineEntry>,
    pub statistics: Statistics,
    pub failures: Vec<FailureSummary>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl AnalysisReport {
    pub fn new(result: &AnalysisResult, timeline_limit: usize) -> Self {
        AnalysisReport {
            programs: result
                .programs
                .iter()
                .map(|(name, program)| (name.clone(), ProgramSummary::from(program)))
                .collect(),
            timeline: result
                .timeline
                .iter()
                .take(timeline_limit)
                .map(TimelineEntry::from)
                .collect(),
            statistics: result.statistics(),
            failures: result
                .failures
                .iter()
                .map(|e| FailureSummary {
                    filename: e.filename().to_owned(),
                    error: e.to_string(),
                })
                .collect(),
            cancelled: result.cancelled,
        }
    }

    pub fn to_json(&self, indent: bool) -> serde_json::Result<String> {
        if indent {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
