use jiff::Timestamp;
use log::trace;
use serde::Serialize;

use crate::err::{PrefetchError, Result};
use crate::utils::{bytes, decode_utf16le_lossy_trimmed, filetime_to_execution_time};

/// Size of the executable name field, in bytes (29 UTF-16 characters and a terminator).
const EXECUTABLE_NAME_SIZE: usize = 60;
const EXECUTABLE_NAME_OFFSET: usize = 0x10;
const PREFETCH_HASH_OFFSET: usize = 0x4C;

/// Prefetch format versions, as stored in the first 4 bytes of the (uncompressed) file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrefetchVersion {
    WindowsXp = 17,
    WindowsVista = 23,
    Windows8 = 26,
    Windows10 = 30,
}

impl PrefetchVersion {
    pub fn from_u32(version: u32) -> Option<PrefetchVersion> {
        match version {
            17 => Some(PrefetchVersion::WindowsXp),
            23 => Some(PrefetchVersion::WindowsVista),
            26 => Some(PrefetchVersion::Windows8),
            30 => Some(PrefetchVersion::Windows10),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// The Windows releases that write this version.
    pub fn name(self) -> &'static str {
        match self {
            PrefetchVersion::WindowsXp => "Windows XP/2003",
            PrefetchVersion::WindowsVista => "Windows Vista/7",
            PrefetchVersion::Windows8 => "Windows 8.1",
            PrefetchVersion::Windows10 => "Windows 10/11",
        }
    }

    fn layout(self) -> &'static RecordLayout {
        match self {
            PrefetchVersion::WindowsXp => &LAYOUT_V17,
            PrefetchVersion::WindowsVista => &LAYOUT_V23,
            PrefetchVersion::Windows8 | PrefetchVersion::Windows10 => &LAYOUT_V26,
        }
    }
}

impl Serialize for PrefetchVersion {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

#[derive(Debug)]
enum ExecutionTimeLayout {
    /// A single "last run" FILETIME.
    Single { offset: usize },
    /// An array of FILETIMEs, most recent first.
    Multiple {
        offset: usize,
        count: usize,
        stride: usize,
    },
}

#[derive(Debug)]
struct RecordLayout {
    run_count_offset: usize,
    execution_times: ExecutionTimeLayout,
}

static LAYOUT_V17: RecordLayout = RecordLayout {
    run_count_offset: 0x90,
    execution_times: ExecutionTimeLayout::Single { offset: 0x78 },
};

static LAYOUT_V23: RecordLayout = RecordLayout {
    run_count_offset: 0x98,
    execution_times: ExecutionTimeLayout::Single { offset: 0x80 },
};

static LAYOUT_V26: RecordLayout = RecordLayout {
    run_count_offset: 0xD0,
    execution_times: ExecutionTimeLayout::Multiple {
        offset: 0x80,
        count: 8,
        stride: 8,
    },
};

/// The execution information held by a single prefetch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchRecord {
    pub filename: String,
    pub version: PrefetchVersion,
    pub executable_name: String,
    /// The path hash, as 8 uppercase hex digits.
    pub prefetch_hash: String,
    pub run_count: u32,
    /// Most recent first. Unset (zero) FILETIMEs are not included.
    pub execution_times: Vec<Timestamp>,
    pub last_execution: Option<Timestamp>,
}

impl PrefetchRecord {
    /// Parses an uncompressed prefetch buffer.
    pub fn from_bytes(filename: impl Into<String>, data: &[u8]) -> Result<PrefetchRecord> {
        let filename = filename.into();
        let truncated = |e| PrefetchError::truncated(&filename, e);

        let raw_version = bytes::read_u32_le_r(data, 0, "format version").map_err(truncated)?;
        let version = PrefetchVersion::from_u32(raw_version).ok_or_else(|| {
            PrefetchError::UnsupportedPrefetchVersion {
                filename: filename.clone(),
                version: raw_version,
            }
        })?;
        let layout = version.layout();

        trace!("{}: version {} ({})", filename, raw_version, version.name());

        let name_bytes = bytes::slice_r(
            data,
            EXECUTABLE_NAME_OFFSET,
            EXECUTABLE_NAME_SIZE,
            "executable name",
        )
        .map_err(truncated)?;
        let executable_name = decode_utf16le_lossy_trimmed(name_bytes);

        let hash = bytes::read_u32_le_r(data, PREFETCH_HASH_OFFSET, "prefetch hash")
            .map_err(truncated)?;
        let run_count =
            bytes::read_u32_le_r(data, layout.run_count_offset, "run count").map_err(truncated)?;

        let execution_times = match layout.execution_times {
            ExecutionTimeLayout::Single { offset } => {
                let filetime =
                    bytes::read_u64_le_r(data, offset, "last run time").map_err(truncated)?;
                filetime_to_execution_time(filetime).into_iter().collect()
            }
            ExecutionTimeLayout::Multiple {
                offset,
                count,
                stride,
            } => (0..count)
                .map_while(|i| bytes::read_u64_le(data, offset + i * stride))
                .filter_map(filetime_to_execution_time)
                .collect::<Vec<_>>(),
        };

        Ok(PrefetchRecord {
            last_execution: execution_times.first().copied(),
            filename,
            version,
            executable_name,
            prefetch_hash: format!("{:08X}", hash),
            run_count,
            execution_times,
        })
    }

    pub fn version_name(&self) -> &'static str {
        self.version.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // 2024-01-01T09:00:00Z and 2024-01-03T10:00:00Z
    const JAN_1: u64 = 133_485_732_000_000_000;
    const JAN_3: u64 = 133_487_496_000_000_000;

    fn header(version: u32, len: usize, name: &str, hash: u32) -> Vec<u8> {
        let mut data = vec![0_u8; len];
        data[..4].copy_from_slice(&version.to_le_bytes());
        for (i, unit) in name.encode_utf16().enumerate() {
            let at = EXECUTABLE_NAME_OFFSET + i * 2;
            data[at..at + 2].copy_from_slice(&unit.to_le_bytes());
        }
        data[0x4C..0x50].copy_from_slice(&hash.to_le_bytes());
        data
    }

    fn put_u32(data: &mut [u8], offset: usize, value: u32) {
        data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(data: &mut [u8], offset: usize, value: u64) {
        data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_parses_version_17() {
        let mut data = header(17, 0x98, "CMD.EXE", 0x0AB1_2C3D);
        put_u64(&mut data, 0x78, JAN_1);
        put_u32(&mut data, 0x90, 4);

        let record = PrefetchRecord::from_bytes("CMD.EXE-0AB12C3D.pf", &data).unwrap();
        assert_eq!(record.version, PrefetchVersion::WindowsXp);
        assert_eq!(record.version_name(), "Windows XP/2003");
        assert_eq!(record.executable_name, "CMD.EXE");
        assert_eq!(record.prefetch_hash, "0AB12C3D");
        assert_eq!(record.run_count, 4);
        assert_eq!(record.execution_times, vec![ts("2024-01-01T09:00:00Z")]);
        assert_eq!(record.last_execution, Some(ts("2024-01-01T09:00:00Z")));
    }

    #[test]
    fn test_parses_version_23() {
        let mut data = header(23, 0xA0, "EXPLORER.EXE", 0xDEADBEEF);
        put_u64(&mut data, 0x80, JAN_3);
        put_u32(&mut data, 0x98, 11);
        // Where version 17 keeps its fields; must be ignored.
        put_u64(&mut data, 0x78, JAN_1);
        put_u32(&mut data, 0x90, 99);

        let record = PrefetchRecord::from_bytes("EXPLORER.EXE-DEADBEEF.pf", &data).unwrap();
        assert_eq!(record.version.as_u32(), 23);
        assert_eq!(record.prefetch_hash, "DEADBEEF");
        assert_eq!(record.run_count, 11);
        assert_eq!(record.execution_times, vec![ts("2024-01-03T10:00:00Z")]);
    }

    #[test]
    fn test_parses_multiple_execution_times() {
        for version in [26, 30] {
            let mut data = header(version, 0xD4, "NOTEPAD.EXE", 0x1);
            put_u64(&mut data, 0x80, JAN_3);
            put_u64(&mut data, 0x88, JAN_1);
            put_u32(&mut data, 0xD0, 5);

            let record = PrefetchRecord::from_bytes("NOTEPAD.EXE-00000001.pf", &data).unwrap();
            assert_eq!(record.version.as_u32(), version);
            assert_eq!(record.prefetch_hash, "00000001");
            assert_eq!(record.run_count, 5);
            assert_eq!(
                record.execution_times,
                vec![ts("2024-01-03T10:00:00Z"), ts("2024-01-01T09:00:00Z")]
            );
            assert_eq!(record.last_execution, Some(ts("2024-01-03T10:00:00Z")));
        }
    }

    #[test]
    fn test_executable_name_keeps_embedded_nul() {
        let data = header(30, 0xD4, "AB\0XY", 0);
        let record = PrefetchRecord::from_bytes("AB.pf", &data).unwrap();
        assert_eq!(record.executable_name, "AB\0XY");
    }

    #[test]
    fn test_zero_filetimes_are_skipped() {
        let mut data = header(30, 0xD4, "A.EXE", 0);
        put_u64(&mut data, 0x90, JAN_1);

        let record = PrefetchRecord::from_bytes("A.pf", &data).unwrap();
        assert_eq!(record.execution_times, vec![ts("2024-01-01T09:00:00Z")]);

        let data = header(30, 0xD4, "B.EXE", 0);
        let record = PrefetchRecord::from_bytes("B.pf", &data).unwrap();
        assert!(record.execution_times.is_empty());
        assert_eq!(record.last_execution, None);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let data = header(31, 0xD4, "A.EXE", 0);
        match PrefetchRecord::from_bytes("A.pf", &data) {
            Err(PrefetchError::UnsupportedPrefetchVersion { filename, version }) => {
                assert_eq!(filename, "A.pf");
                assert_eq!(version, 31);
            }
            other => panic!("expected unsupported version, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record() {
        let data = header(23, 0x90, "A.EXE", 0);
        match PrefetchRecord::from_bytes("A.pf", &data) {
            Err(PrefetchError::TruncatedRecord { what, offset, .. }) => {
                assert_eq!(what, "run count");
                assert_eq!(offset, 0x98);
            }
            other => panic!("expected truncation, got {:?}", other),
        }

        match PrefetchRecord::from_bytes("B.pf", &[0x11, 0x00]) {
            Err(PrefetchError::TruncatedRecord { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("expected truncation, got {:?}", other),
        }
    }
}
