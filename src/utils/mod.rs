pub(crate) mod bytes;
mod utf16;
mod windows;

pub(crate) use self::utf16::decode_utf16le_lossy_trimmed;
pub use self::windows::{filetime_to_execution_time, filetime_to_timestamp};
