use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrefetchError>;
pub type DeserializationResult<T> = std::result::Result<T, DeserializationError>;

/// Errors raised while reading fixed-offset fields out of a byte buffer.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("buffer too small for {what} at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("FILETIME {filetime:#018x} is out of the representable range")]
    InvalidDateTime { filetime: u64 },
}

impl DeserializationError {
    /// Offset (from the start of the buffer) at which the failure occurred.
    pub fn offset(&self) -> u64 {
        match self {
            DeserializationError::Truncated { offset, .. } => *offset,
            DeserializationError::InvalidDateTime { .. } => 0,
        }
    }
}

/// Errors raised by the LZNT1 decoder when running in strict mode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Lznt1Error {
    #[error(
        "back-reference at input offset {offset} points {distance} bytes back, but only {available} bytes were produced"
    )]
    InvalidBackReference {
        offset: usize,
        distance: usize,
        available: usize,
    },
}

/// A failure to turn a single prefetch file into a record.
///
/// None of these abort a batch; they are collected and reported per file.
#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("{filename}: decompressed size mismatch (expected {expected} bytes, got {actual})")]
    DecompressionSizeMismatch {
        filename: String,
        expected: u32,
        actual: usize,
    },

    #[error("{filename}: compressed stream is corrupt: {source}")]
    CorruptCompressedStream {
        filename: String,
        #[source]
        source: Lznt1Error,
    },

    #[error("{filename}: unsupported prefetch version {version}")]
    UnsupportedPrefetchVersion { filename: String, version: u32 },

    #[error("{filename}: record truncated while reading {what} at offset {offset:#x}")]
    TruncatedRecord {
        filename: String,
        what: &'static str,
        offset: u64,
    },

    #[error("{filename}: failed to read file: {source}")]
    FileReadError {
        filename: String,
        #[source]
        source: io::Error,
    },
}

impl PrefetchError {
    pub fn filename(&self) -> &str {
        match self {
            PrefetchError::DecompressionSizeMismatch { filename, .. }
            | PrefetchError::CorruptCompressedStream { filename, .. }
            | PrefetchError::UnsupportedPrefetchVersion { filename, .. }
            | PrefetchError::TruncatedRecord { filename, .. }
            | PrefetchError::FileReadError { filename, .. } => filename,
        }
    }

    /// Whether the failure happened while unpacking a `MAM` container.
    pub fn is_decompression_failure(&self) -> bool {
        matches!(
            self,
            PrefetchError::DecompressionSizeMismatch { .. }
                | PrefetchError::CorruptCompressedStream { .. }
        )
    }

    pub(crate) fn truncated(filename: &str, err: DeserializationError) -> Self {
        let what = match &err {
            DeserializationError::Truncated { what, .. } => *what,
            DeserializationError::InvalidDateTime { .. } => "FILETIME",
        };

        PrefetchError::TruncatedRecord {
            filename: filename.to_owned(),
            what,
            offset: err.offset(),
        }
    }
}

/// Errors that abort an entire analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to enumerate prefetch files: {source}")]
    Enumeration {
        #[source]
        source: io::Error,
    },
}
