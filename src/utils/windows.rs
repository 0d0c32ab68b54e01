use jiff::Timestamp;
use log::debug;

use crate::err::{DeserializationError, DeserializationResult};

/// Microseconds between 1601-01-01T00:00:00Z and the unix epoch.
const WINDOWS_TO_UNIX_MICROS: i64 = 11_644_473_600 * 1_000_000;

/// Converts a Windows FILETIME (100ns intervals since 1601-01-01 UTC) to a timestamp.
///
/// Precision is truncated to whole microseconds.
pub fn filetime_to_timestamp(filetime: u64) -> DeserializationResult<Timestamp> {
    let micros = (filetime / 10) as i64 - WINDOWS_TO_UNIX_MICROS;
    Timestamp::from_microsecond(micros)
        .map_err(|_| DeserializationError::InvalidDateTime { filetime })
}

/// Like [`filetime_to_timestamp`], but treats the zero sentinel (and anything jiff cannot
/// represent) as "no execution recorded".
pub fn filetime_to_execution_time(filetime: u64) -> Option<Timestamp> {
    if filetime == 0 {
        return None;
    }

    match filetime_to_timestamp(filetime) {
        Ok(ts) => Some(ts),
        Err(e) => {
            debug!("Ignoring execution time: {}", e);
            None
        }
    }
}
