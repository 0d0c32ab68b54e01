//! LZNT1 decompression, as used for the payload of `MAM\x04` prefetch containers.
//!
//! The stream is a sequence of chunks. Each chunk starts with a little-endian `u16` header:
//! the low 12 bits hold `chunk_size - 1`, bit 15 marks the chunk as compressed, and a zero
//! header terminates the stream.
//!
//! A compressed chunk is a run of groups, each made of one flag byte followed by up to eight
//! tokens. Flag bits are consumed low bit first: a clear bit is a literal byte, a set bit is a
//! 2-byte back-reference whose length/displacement split depends on how much output has been
//! produced so far.

use log::trace;

use crate::err::Lznt1Error;
use crate::utils::bytes;

const CHUNK_SIZE_MASK: u16 = 0x0FFF;
const CHUNK_COMPRESSED_FLAG: u16 = 0x8000;
const MIN_MATCH_LENGTH: usize = 3;
/// A 2 byte back-reference yields at most 4098 bytes.
const MAX_EXPANSION: usize = 2049;

/// What to do with a back-reference that points before the start of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackReferencePolicy {
    /// Emit `match_length` zero bytes and keep going.
    #[default]
    ZeroFill,
    /// Fail the whole stream with [`Lznt1Error::InvalidBackReference`].
    Strict,
}

/// Splits a back-reference token into `(match_length, match_distance)`.
///
/// The number of displacement bits grows with the amount of output produced so far; the rest of
/// the 16 bits encode the length.
#[inline]
fn split_token(token: u16, produced: usize) -> (usize, usize) {
    let displacement_bits: u32 = match produced {
        0..0x10 => 4,
        0x10..0x20 => 5,
        0x20..0x1000 => 6,
        _ => 12,
    };
    let length_bits = 16 - displacement_bits;
    let length_mask = (1_u16 << length_bits) - 1;

    let match_length = usize::from(token & length_mask) + MIN_MATCH_LENGTH;
    let match_distance = usize::from(token >> length_bits) + 1;
    (match_length, match_distance)
}

/// Decompresses an LZNT1 stream, producing at most `target_size` bytes.
///
/// Decoding stops at a zero chunk header, when the input is exhausted, or once `target_size`
/// bytes were produced, whichever comes first. The returned buffer may therefore be shorter than
/// `target_size`; callers that know the exact size must check it.
pub fn decompress(
    input: &[u8],
    target_size: usize,
    policy: BackReferencePolicy,
) -> Result<Vec<u8>, Lznt1Error> {
    // The declared size is untrusted; never allocate more than the input can expand to.
    let limit = target_size.min(input.len().saturating_mul(MAX_EXPANSION));
    let mut out = vec![0_u8; limit];
    let mut written = 0_usize;
    let mut pos = 0_usize;

    while pos < input.len() && written < limit {
        let Some(header) = bytes::read_u16_le(input, pos) else {
            break;
        };
        pos += 2;

        if header == 0 {
            trace!("End of stream marker at offset {}", pos - 2);
            break;
        }

        let chunk_size = usize::from(header & CHUNK_SIZE_MASK) + 1;
        let chunk_end = pos + chunk_size;

        if header & CHUNK_COMPRESSED_FLAG == 0 {
            trace!(
                "Uncompressed chunk at offset {} ({} bytes)",
                pos - 2,
                chunk_size
            );
            let available = chunk_end.min(input.len()) - pos;
            let n = available.min(limit - written);
            out[written..written + n].copy_from_slice(&input[pos..pos + n]);
            written += n;
            pos = chunk_end;
            continue;
        }

        trace!(
            "Compressed chunk at offset {} ({} bytes), {} bytes produced so far",
            pos - 2,
            chunk_size,
            written
        );

        while pos < chunk_end && pos < input.len() && written < limit {
            let flags = input[pos];
            pos += 1;

            for bit in 0..8 {
                if written >= limit || pos >= chunk_end {
                    break;
                }

                if flags & (1 << bit) == 0 {
                    let Some(&literal) = input.get(pos) else {
                        break;
                    };
                    out[written] = literal;
                    written += 1;
                    pos += 1;
                    continue;
                }

                let token_offset = pos;
                let Some(token) = bytes::read_u16_le(input, pos) else {
                    break;
                };
                pos += 2;

                let (match_length, match_distance) = split_token(token, written);
                let n = match_length.min(limit - written);

                if match_distance > written {
                    match policy {
                        BackReferencePolicy::Strict => {
                            return Err(Lznt1Error::InvalidBackReference {
                                offset: token_offset,
                                distance: match_distance,
                                available: written,
                            });
                        }
                        BackReferencePolicy::ZeroFill => {
                            trace!(
                                "Invalid back-reference at offset {} (distance {}, produced {}), zero filling {} bytes",
                                token_offset,
                                match_distance,
                                written,
                                n
                            );
                            out[written..written + n].fill(0);
                            written += n;
                        }
                    }
                    continue;
                }

                // Source and destination may overlap, so this has to go byte by byte.
                let mut src = written - match_distance;
                for _ in 0..n {
                    out[written] = out[src];
                    written += 1;
                    src += 1;
                }
            }
        }
    }

    out.truncate(written);
    Ok(out)
}
