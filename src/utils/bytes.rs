//! Little-endian reads out of `&[u8]` at fixed offsets.
//!
//! Prefetch headers are parsed by absolute offset, so everything here takes the whole buffer plus
//! an offset rather than advancing a cursor.
//!
//! - **Option layer** (`read_*`): return `None` when the range is out of bounds.
//! - **Result layer** (`*_r`): map `None` to [`DeserializationError::Truncated`], naming the field.

use crate::err::DeserializationError;

/// Read `N` raw bytes at `offset`.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    let bytes: [u8; N] = buf.get(offset..end)?.try_into().ok()?;
    Some(bytes)
}

/// Read a 4-byte signature at `offset`.
pub(crate) fn read_sig(buf: &[u8], offset: usize) -> Option<[u8; 4]> {
    read_array::<4>(buf, offset)
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(read_array::<2>(buf, offset)?))
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(read_array::<4>(buf, offset)?))
}

pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(read_array::<8>(buf, offset)?))
}

#[inline]
fn truncated(what: &'static str, offset: usize, need: usize, len: usize) -> DeserializationError {
    DeserializationError::Truncated {
        what,
        offset: offset as u64,
        need,
        have: len.saturating_sub(offset),
    }
}

pub(crate) fn slice_r<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], DeserializationError> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))?;
    buf.get(offset..end)
        .ok_or_else(|| truncated(what, offset, len, buf.len()))
}

/// Read a `u32` (little-endian) at `offset`, or return `DeserializationError::Truncated`.
pub(crate) fn read_u32_le_r(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<u32, DeserializationError> {
    read_u32_le(buf, offset).ok_or_else(|| truncated(what, offset, 4, buf.len()))
}

/// Read a `u64` (little-endian) at `offset`, or return `DeserializationError::Truncated`.
pub(crate) fn read_u64_le_r(
    buf: &[u8],
    offset: usize,
    what: &'static str,
) -> Result<u64, DeserializationError> {
    read_u64_le(buf, offset).ok_or_else(|| truncated(what, offset, 8, buf.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian_values() {
        let buf = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        assert_eq!(read_u16_le(&buf, 0), Some(0x2211));
        assert_eq!(read_u32_le(&buf, 4), Some(0x8877_6655));
        assert_eq!(read_u64_le(&buf, 0), Some(0x8877_6655_4433_2211));
        assert_eq!(read_sig(&buf, 0), Some([0x11, 0x22, 0x33, 0x44]));
    }

    #[test]
    fn test_out_of_bounds_reads() {
        let buf = [0_u8; 6];
        assert_eq!(read_u32_le(&buf, 3), None);
        assert_eq!(read_u64_le(&buf, usize::MAX), None);

        match read_u32_le_r(&buf, 4, "run count") {
            Err(DeserializationError::Truncated {
                what,
                offset,
                need,
                have,
            }) => {
                assert_eq!(what, "run count");
                assert_eq!(offset, 4);
                assert_eq!(need, 4);
                assert_eq!(have, 2);
            }
            other => panic!("expected truncation, got {:?}", other),
        }

        assert!(slice_r(&buf, 2, 4, "name").is_ok());
        assert!(slice_r(&buf, 2, 5, "name").is_err());
    }
}
