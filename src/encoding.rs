//! Little-endian base-128 varints, shared by the WAL and segment formats.
//!
//! Each byte carries 7 bits of payload, least significant group first;
//! the high bit is set on every byte except the last.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Longest encoding of a u64 (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` as a varint.
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Reads a varint, advancing `buf`.
///
/// Returns [`Error::Incomplete`] if the buffer ends mid-varint, and
/// [`Error::Corruption`] if the encoding is longer than a u64 allows.
pub fn get_varint(buf: &mut impl Buf) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0;

    loop {
        if shift >= 64 {
            return Err(Error::Corruption("varint overflow".into()));
        }
        if !buf.has_remaining() {
            return Err(Error::Incomplete);
        }

        let byte = buf.get_u8();
        if shift == 63 && byte > 1 {
            return Err(Error::Corruption("varint overflow".into()));
        }
        value |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok(value);
        }

        shift += 7;
    }
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Reads a varint length prefix followed by that many bytes.
pub fn get_length_prefixed(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = get_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(Error::Incomplete);
    }
    let out = (*buf)[..len].to_vec();
    buf.advance(len);
    Ok(out)
}

/// Writes a varint length prefix followed by `data`.
pub fn put_length_prefixed(buf: &mut impl BufMut, data: &[u8]) {
    put_varint(buf, data.len() as u64);
    buf.put_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (300, &[0xAC, 0x02]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            put_varint(&mut buf, *value);
            assert_eq!(buf.as_slice(), *expected, "encoding of {value}");
            assert_eq!(varint_len(*value), expected.len());
        }
    }

    #[test]
    fn max_value_uses_ten_bytes() {
        let mut buf = Vec::new();
        put_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
        assert_eq!(get_varint(&mut buf.as_slice()).unwrap(), u64::MAX);
    }

    #[test]
    fn truncated_varint_is_incomplete() {
        let mut data: &[u8] = &[0x80, 0x80];
        assert!(matches!(get_varint(&mut data), Err(Error::Incomplete)));
    }

    #[test]
    fn overlong_varint_is_corruption() {
        let mut data: &[u8] = &[0xFF; 11];
        assert!(matches!(get_varint(&mut data), Err(Error::Corruption(_))));
    }

    #[test]
    fn length_prefixed_short_payload_is_incomplete() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 10);
        buf.extend_from_slice(b"abc");
        assert!(matches!(
            get_length_prefixed(&mut buf.as_slice()),
            Err(Error::Incomplete)
        ));
    }
}
