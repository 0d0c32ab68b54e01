#![allow(dead_code)]
use std::sync::Once;

use byteorder::{LittleEndian, WriteBytesExt};
use jiff::Timestamp;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .is_test(true)
            .init();
    });
}

pub fn ts(s: &str) -> Timestamp {
    s.parse().expect("valid timestamp")
}

/// Converts an RFC 3339 timestamp into a Windows FILETIME.
pub fn filetime(s: &str) -> u64 {
    let micros = ts(s).as_microsecond() + 11_644_473_600 * 1_000_000;
    (micros as u64) * 10
}

/// Builds synthetic, uncompressed prefetch files for any supported layout.
#[derive(Debug, Clone)]
pub struct PrefetchBuilder {
    version: u32,
    executable_name: String,
    hash: u32,
    run_count: u32,
    filetimes: Vec<u64>,
    trailer: Vec<u8>,
}

impl PrefetchBuilder {
    pub fn new(version: u32, executable_name: &str) -> Self {
        PrefetchBuilder {
            version,
            executable_name: executable_name.to_owned(),
            hash: 0,
            run_count: 0,
            filetimes: vec![],
            trailer: vec![],
        }
    }

    pub fn hash(mut self, hash: u32) -> Self {
        self.hash = hash;
        self
    }

    pub fn run_count(mut self, run_count: u32) -> Self {
        self.run_count = run_count;
        self
    }

    /// Execution times, most recent first. Versions 17 and 23 only keep the first one.
    pub fn executed_at(mut self, times: &[&str]) -> Self {
        self.filetimes = times.iter().map(|t| filetime(t)).collect();
        self
    }

    pub fn raw_filetimes(mut self, filetimes: &[u64]) -> Self {
        self.filetimes = filetimes.to_vec();
        self
    }

    /// Appends a file-metrics-like section of repeated UTF-16 paths, which compresses well.
    pub fn with_file_list(mut self) -> Self {
        for (i, dll) in ["NTDLL.DLL", "KERNEL32.DLL", "KERNELBASE.DLL", "USER32.DLL"]
            .iter()
            .cycle()
            .take(24)
            .enumerate()
        {
            let path = format!("\\VOLUME{{01d4a2b3c4d5e6f7-{:04}}}\\WINDOWS\\SYSTEM32\\{}", i, dll);
            for unit in path.encode_utf16() {
                self.trailer.write_u16::<LittleEndian>(unit).unwrap();
            }
            self.trailer.write_u16::<LittleEndian>(0).unwrap();
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let (run_count_offset, times_offset, slots) = match self.version {
            17 => (0x90, 0x78, 1),
            23 => (0x98, 0x80, 1),
            _ => (0xD0, 0x80, 8),
        };

        let mut data = vec![0_u8; 0xF0];
        data[..4].copy_from_slice(&self.version.to_le_bytes());
        data[4..8].copy_from_slice(b"SCCA");

        let name: Vec<u8> = self
            .executable_name
            .encode_utf16()
            .take(29)
            .flat_map(|u| u.to_le_bytes())
            .collect();
        data[0x10..0x10 + name.len()].copy_from_slice(&name);

        data[0x4C..0x50].copy_from_slice(&self.hash.to_le_bytes());
        data[run_count_offset..run_count_offset + 4].copy_from_slice(&self.run_count.to_le_bytes());

        for (i, ft) in self.filetimes.iter().take(slots).enumerate() {
            let at = times_offset + i * 8;
            data[at..at + 8].copy_from_slice(&ft.to_le_bytes());
        }

        data.extend_from_slice(&self.trailer);
        data
    }

    pub fn build_compressed(&self) -> Vec<u8> {
        mam_wrap(&self.build())
    }
}

/// Wraps `plain` into a `MAM\x04` container, declaring its exact size.
pub fn mam_wrap(plain: &[u8]) -> Vec<u8> {
    mam_wrap_declaring(plain.len() as u32, &lznt1_compress(plain))
}

pub fn mam_wrap_declaring(declared_size: u32, stream: &[u8]) -> Vec<u8> {
    let mut data = b"MAM\x04".to_vec();
    data.write_u32::<LittleEndian>(declared_size).unwrap();
    data.extend_from_slice(stream);
    data
}

const BLOCK_SIZE: usize = 2048;
const SEARCH_WINDOW: usize = 1024;

/// Reference LZNT1 compressor producing streams in the layout the decoder expects.
///
/// Greedy longest-match within a bounded window. Blocks that do not shrink are stored
/// uncompressed.
pub fn lznt1_compress(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut start = 0;

    while start < plain.len() {
        let end = (start + BLOCK_SIZE).min(plain.len());
        let body = compress_block(plain, start, end);

        if body.len() < end - start {
            out.write_u16::<LittleEndian>(0x8000 | (body.len() as u16 - 1))
                .unwrap();
            out.extend_from_slice(&body);
        } else {
            out.write_u16::<LittleEndian>((end - start) as u16 - 1)
                .unwrap();
            out.extend_from_slice(&plain[start..end]);
        }
        start = end;
    }

    out.write_u16::<LittleEndian>(0).unwrap();
    out
}

fn compress_block(plain: &[u8], start: usize, end: usize) -> Vec<u8> {
    let mut body = Vec::new();
    let mut pos = start;

    while pos < end {
        let flag_index = body.len();
        body.push(0_u8);

        for bit in 0..8 {
            if pos >= end {
                break;
            }

            let displacement_bits = match pos {
                0..0x10 => 4,
                0x10..0x20 => 5,
                0x20..0x1000 => 6,
                _ => 12,
            };
            let length_bits = 16 - displacement_bits;
            let max_distance = (1_usize << displacement_bits).min(pos).min(SEARCH_WINDOW);
            let max_length = ((1_usize << length_bits) - 1 + 3).min(end - pos);

            let (mut best_length, mut best_distance) = (0, 0);
            for distance in 1..=max_distance {
                let mut length = 0;
                while length < max_length && plain[pos - distance + length] == plain[pos + length] {
                    length += 1;
                }
                if length > best_length {
                    best_length = length;
                    best_distance = distance;
                    if length == max_length {
                        break;
                    }
                }
            }

            if best_length >= 3 {
                body[flag_index] |= 1 << bit;
                let token = ((best_distance - 1) << length_bits) | (best_length - 3);
                body.write_u16::<LittleEndian>(token as u16).unwrap();
                pos += best_length;
            } else {
                body.push(plain[pos]);
                pos += 1;
            }
        }
    }

    body
}
