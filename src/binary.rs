//! C1: endian & binary primitives.
//!
//! Every read in this crate threads endianness explicitly (spec §9, "dual endian
//! everywhere") rather than relying on global state. A record parsed on the console
//! layout and the same record parsed on the desktop layout must differ only in the
//! value carried by [`Endian`], never in which code path runs.

/// Byte layout of a record or subrecord stream.
///
/// Console (big-endian) captures store four-character signatures byte-reversed
/// relative to their canonical little-endian spelling (spec §3). Everything else -
/// integers, floats - follows the same endianness as the signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn is_big(self) -> bool {
        matches!(self, Endian::Big)
    }
}

/// Bounds-checked read of a `u16` at `offset` within `buf`.
pub fn read_u16(buf: &[u8], offset: usize, endian: Endian) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u16::from_le_bytes(bytes),
        Endian::Big => u16::from_be_bytes(bytes),
    })
}

/// Bounds-checked read of an `i16` at `offset` within `buf`.
pub fn read_i16(buf: &[u8], offset: usize, endian: Endian) -> Option<i16> {
    read_u16(buf, offset, endian).map(|v| v as i16)
}

/// Bounds-checked read of a `u32` at `offset` within `buf`.
pub fn read_u32(buf: &[u8], offset: usize, endian: Endian) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(match endian {
        Endian::Little => u32::from_le_bytes(bytes),
        Endian::Big => u32::from_be_bytes(bytes),
    })
}

/// Bounds-checked read of an `i32` at `offset` within `buf`.
pub fn read_i32(buf: &[u8], offset: usize, endian: Endian) -> Option<i32> {
    read_u32(buf, offset, endian).map(|v| v as i32)
}

/// Bounds-checked read of an `f32` at `offset` within `buf`.
pub fn read_f32(buf: &[u8], offset: usize, endian: Endian) -> Option<f32> {
    read_u32(buf, offset, endian).map(f32::from_bits)
}

/// Bounds-checked read of a single byte at `offset`.
pub fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Bounds-checked read of a signed byte at `offset`.
pub fn read_i8(buf: &[u8], offset: usize) -> Option<i8> {
    read_u8(buf, offset).map(|v| v as i8)
}

/// Bounds-checked read of an exact 4-byte signature at `offset`, left in on-disk order.
pub fn read_signature(buf: &[u8], offset: usize) -> Option<[u8; 4]> {
    buf.get(offset..offset + 4)?.try_into().ok()
}

/// Reverses a 4-byte signature; the console layout stores signatures byte-reversed
/// relative to their canonical little-endian spelling (spec §3).
pub fn reverse_signature(sig: [u8; 4]) -> [u8; 4] {
    [sig[3], sig[2], sig[1], sig[0]]
}

/// Normalises an on-disk signature to its canonical (little-endian) spelling.
pub fn canonical_signature(sig: [u8; 4], endian: Endian) -> [u8; 4] {
    match endian {
        Endian::Little => sig,
        Endian::Big => reverse_signature(sig),
    }
}

/// True if every byte of `sig` is an ASCII alphanumeric character or underscore, the
/// constraint spec §3 places on main-record signatures.
pub fn is_alphanumeric_or_underscore(sig: [u8; 4]) -> bool {
    sig.iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}

/// True if every byte of `sig` is uppercase ASCII - the dump scanner's fallback test
/// for "looks like a record signature" when the registry doesn't recognise it
/// (spec §4.4).
pub fn is_uppercase_ascii(sig: [u8; 4]) -> bool {
    sig.iter().all(|&b| b.is_ascii_uppercase())
}

/// True if every byte is printable ASCII (0x20..=0x7e). Used to reject form ids and
/// main-record candidates that are actually string data (spec §3, §4.4 S3).
pub fn is_all_printable_ascii(bytes: [u8; 4]) -> bool {
    bytes.iter().all(|&b| (0x20..=0x7e).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_round_trip() {
        let buf = 0x1234_5678u32.to_le_bytes();
        assert_eq!(read_u32(&buf, 0, Endian::Little), Some(0x1234_5678));
    }

    #[test]
    fn be_round_trip() {
        let buf = 0x1234_5678u32.to_be_bytes();
        assert_eq!(read_u32(&buf, 0, Endian::Big), Some(0x1234_5678));
    }

    #[test]
    fn out_of_bounds_is_none() {
        let buf = [0u8; 2];
        assert_eq!(read_u32(&buf, 0, Endian::Little), None);
    }

    #[test]
    fn signature_reversal() {
        assert_eq!(reverse_signature(*b"TES4"), *b"4SET");
        assert_eq!(canonical_signature(*b"4SET", Endian::Big), *b"TES4");
    }

    #[test]
    fn ascii_classification() {
        assert!(is_alphanumeric_or_underscore(*b"TES4"));
        assert!(!is_alphanumeric_or_underscore(*b"TE!4"));
        assert!(is_uppercase_ascii(*b"GRUP"));
        assert!(!is_uppercase_ascii(*b"GruP"));
        assert!(is_all_printable_ascii(*b"PACK"));
    }
}
