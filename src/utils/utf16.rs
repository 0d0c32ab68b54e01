/// Decode a whole UTF-16LE byte slice, then strip trailing NULs.
///
/// Embedded NULs are kept. Unpaired surrogates are dropped rather than failing the whole string,
/// and a trailing odd byte is ignored.
pub(crate) fn decode_utf16le_lossy_trimmed(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]));

    let mut out = String::with_capacity(bytes.len() / 2);
    for ch in std::char::decode_utf16(units).flatten() {
        out.push(ch);
    }

    let trimmed_len = out.trim_end_matches('\0').len();
    out.truncate(trimmed_len);
    out
}
