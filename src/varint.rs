//! Signed varint codec used by the trace buffer
//!
//! Two forms, both big-endian and sign-extended:
//!
//! | Form   | First bit | Payload bits | Range                 |
//! |--------|-----------|--------------|-----------------------|
//! | short  | 0         | 15           | `-2^14 .. 2^14`       |
//! | long   | 1         | 31           | `-2^30 .. 2^30`       |
//!
//! Decoding works at any byte offset, so encoded values can be embedded
//! after arbitrary prefixes.

use crate::error::{TraceError, TraceResult};

/// Smallest encodable value
pub const MIN_VALUE: i64 = -(1 << 30);
/// Largest encodable value
pub const MAX_VALUE: i64 = (1 << 30) - 1;

const SHORT_MIN: i64 = -(1 << 14);
const SHORT_MAX: i64 = (1 << 14) - 1;
const LONG_FLAG: u8 = 0x80;

/// Append `value` to `out`, returning the number of bytes written.
pub fn encode_varint_signed(value: i64, out: &mut Vec<u8>) -> TraceResult<usize> {
    if !(MIN_VALUE..=MAX_VALUE).contains(&value) {
        return Err(TraceError::VarintOutOfRange(value));
    }
    if (SHORT_MIN..=SHORT_MAX).contains(&value) {
        let raw = (value as u16) & 0x7fff;
        out.extend_from_slice(&raw.to_be_bytes());
        Ok(2)
    } else {
        let raw = ((value as u32) & 0x7fff_ffff) | 0x8000_0000;
        out.extend_from_slice(&raw.to_be_bytes());
        Ok(4)
    }
}

/// Decode the value starting at `pos`, returning it with the offset just past it.
#[inline]
pub fn decode_varint_signed(bytes: &[u8], pos: usize) -> TraceResult<(i64, usize)> {
    let first = *bytes.get(pos).ok_or(TraceError::Truncated { offset: pos })?;
    if first & LONG_FLAG == 0 {
        let raw = u16::from_be_bytes(read_array(bytes, pos)?);
        let value = ((raw << 1) as i16 >> 1) as i64;
        Ok((value, pos + 2))
    } else {
        let raw = u32::from_be_bytes(read_array(bytes, pos)?);
        let value = ((raw << 1) as i32 >> 1) as i64;
        Ok((value, pos + 4))
    }
}

/// Advance past the value at `pos` without materializing it.
#[inline]
pub fn skip_varint_signed(bytes: &[u8], pos: usize) -> TraceResult<usize> {
    let first = *bytes.get(pos).ok_or(TraceError::Truncated { offset: pos })?;
    let next = if first & LONG_FLAG == 0 { pos + 2 } else { pos + 4 };
    if next > bytes.len() {
        return Err(TraceError::Truncated { offset: pos });
    }
    Ok(next)
}

/// Number of bytes `value` encodes to.
pub fn encoded_len(value: i64) -> usize {
    if (SHORT_MIN..=SHORT_MAX).contains(&value) {
        2
    } else {
        4
    }
}

fn read_array<const N: usize>(bytes: &[u8], pos: usize) -> TraceResult<[u8; N]> {
    bytes
        .get(pos..pos + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(TraceError::Truncated { offset: pos })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint_signed(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_short_form_layout() {
        assert_eq!(encode(0), vec![0x00, 0x00]);
        assert_eq!(encode(1), vec![0x00, 0x01]);
        assert_eq!(encode(-1), vec![0x7f, 0xff]);
        assert_eq!(encode(SHORT_MAX), vec![0x3f, 0xff]);
        assert_eq!(encode(SHORT_MIN), vec![0x40, 0x00]);
    }

    #[test]
    fn test_long_form_layout() {
        assert_eq!(encode(SHORT_MAX + 1), vec![0x80, 0x00, 0x40, 0x00]);
        assert_eq!(encode(-1 - (1 << 14)), vec![0xff, 0xff, 0xbf, 0xff]);
        assert_eq!(encode(MAX_VALUE), vec![0xbf, 0xff, 0xff, 0xff]);
        assert_eq!(encode(MIN_VALUE), vec![0xc0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_boundaries_roundtrip() {
        for value in [
            MIN_VALUE,
            MIN_VALUE + 1,
            SHORT_MIN - 1,
            SHORT_MIN,
            -1,
            0,
            1,
            SHORT_MAX,
            SHORT_MAX + 1,
            MAX_VALUE - 1,
            MAX_VALUE,
        ] {
            let buf = encode(value);
            assert_eq!(buf.len(), encoded_len(value));
            assert_eq!(
                decode_varint_signed(&buf, 0).unwrap(),
                (value, buf.len()),
                "Failed for {}",
                value
            );
            assert_eq!(skip_varint_signed(&buf, 0).unwrap(), buf.len());
        }
    }

    #[test]
    fn test_decode_after_prefix() {
        let mut buf = vec![0xaa, 0xbb, 0xcc];
        encode_varint_signed(-12345678, &mut buf).unwrap();
        encode_varint_signed(7, &mut buf).unwrap();
        let (first, next) = decode_varint_signed(&buf, 3).unwrap();
        assert_eq!((first, next), (-12345678, 7));
        assert_eq!(decode_varint_signed(&buf, next).unwrap(), (7, 9));
    }

    #[test]
    fn test_out_of_range() {
        let mut buf = Vec::new();
        assert_eq!(
            encode_varint_signed(MAX_VALUE + 1, &mut buf),
            Err(TraceError::VarintOutOfRange(MAX_VALUE + 1))
        );
        assert_eq!(
            encode_varint_signed(MIN_VALUE - 1, &mut buf),
            Err(TraceError::VarintOutOfRange(MIN_VALUE - 1))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated() {
        let buf = encode(1 << 20);
        assert_eq!(
            decode_varint_signed(&buf[..3], 0),
            Err(TraceError::Truncated { offset: 0 })
        );
        assert_eq!(
            skip_varint_signed(&buf[..1], 0),
            Err(TraceError::Truncated { offset: 0 })
        );
        assert_eq!(
            decode_varint_signed(&buf, 4),
            Err(TraceError::Truncated { offset: 4 })
        );
    }
}
