use std::borrow::Cow;

use log::debug;

use crate::err::{DeserializationResult, PrefetchError, Result};
use crate::lznt1::{self, BackReferencePolicy};
use crate::utils::bytes;

/// Signature of a compressed (Windows 10+) prefetch file.
pub const MAM_SIGNATURE: [u8; 4] = *b"MAM\x04";
pub const MAM_HEADER_SIZE: usize = 8;

/// The `MAM\x04` envelope: 4 byte signature, 4 byte declared uncompressed size, then the
/// compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MamContainer<'a> {
    pub declared_uncompressed_size: u32,
    pub payload: &'a [u8],
}

/// Returns true if `data` starts with the `MAM\x04` signature.
pub fn is_compressed(data: &[u8]) -> bool {
    bytes::read_sig(data, 0) == Some(MAM_SIGNATURE)
}

impl<'a> MamContainer<'a> {
    /// Parses the container header.
    ///
    /// Returns `Ok(None)` when `data` is not a MAM container at all.
    pub fn from_bytes(data: &'a [u8]) -> DeserializationResult<Option<MamContainer<'a>>> {
        if !is_compressed(data) {
            return Ok(None);
        }

        let declared_uncompressed_size =
            bytes::read_u32_le_r(data, 4, "MAM uncompressed size")?;

        Ok(Some(MamContainer {
            declared_uncompressed_size,
            payload: &data[MAM_HEADER_SIZE..],
        }))
    }

    /// Decompresses the payload, requiring the output to match the declared size exactly.
    pub fn decompress(&self, filename: &str, policy: BackReferencePolicy) -> Result<Vec<u8>> {
        let expected = self.declared_uncompressed_size;
        let out = lznt1::decompress(self.payload, expected as usize, policy).map_err(|source| {
            PrefetchError::CorruptCompressedStream {
                filename: filename.to_owned(),
                source,
            }
        })?;

        if out.len() != expected as usize {
            return Err(PrefetchError::DecompressionSizeMismatch {
                filename: filename.to_owned(),
                expected,
                actual: out.len(),
            });
        }

        Ok(out)
    }
}

/// Unwraps a raw prefetch buffer.
///
/// Uncompressed (legacy) buffers are passed through as-is; MAM containers are decompressed.
pub fn decode<'a>(
    filename: &str,
    data: &'a [u8],
    policy: BackReferencePolicy,
) -> Result<Cow<'a, [u8]>> {
    let container = MamContainer::from_bytes(data)
        .map_err(|e| PrefetchError::truncated(filename, e))?;

    match container {
        None => Ok(Cow::Borrowed(data)),
        Some(container) => {
            debug!(
                "{}: MAM container, {} bytes compressed, {} bytes declared",
                filename,
                container.payload.len(),
                container.declared_uncompressed_size
            );
            let out = container.decompress(filename, policy)?;
            debug!("{}: decompressed successfully", filename);
            Ok(Cow::Owned(out))
        }
    }
}
