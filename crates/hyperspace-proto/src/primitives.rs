//! Primitive field encodings shared by every payload: length-prefixed
//! strings and byte arrays, over little-endian fixed-width integers.

use bytes::{Buf, BufMut};

use crate::codec::ProtoError;

/// Write a `vstr`: a 4-byte little-endian length followed by UTF-8 bytes.
pub fn put_vstr(dst: &mut impl BufMut, value: &str) {
    let bytes = value.as_bytes();
    dst.put_u32_le(bytes.len() as u32);
    dst.put_slice(bytes);
}

/// Read a `vstr`.
///
/// # Errors
///
/// Returns [`ProtoError::Truncated`] if `src` does not hold a complete
/// string, or [`ProtoError::Utf8`] if the bytes are not valid UTF-8.
pub fn get_vstr(src: &mut impl Buf) -> Result<String, ProtoError> {
    if src.remaining() < 4 {
        return Err(ProtoError::Truncated);
    }
    let len = src.get_u32_le() as usize;
    if src.remaining() < len {
        return Err(ProtoError::Truncated);
    }
    let mut bytes = vec![0u8; len];
    src.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| ProtoError::Utf8(e.utf8_error()))
}

/// Write a `bytes32`: a 4-byte little-endian length followed by raw bytes.
pub fn put_bytes32(dst: &mut impl BufMut, value: &[u8]) {
    dst.put_u32_le(value.len() as u32);
    dst.put_slice(value);
}

/// Read a `bytes32`.
///
/// # Errors
///
/// Returns [`ProtoError::Truncated`] if `src` does not hold a complete
/// byte array.
pub fn get_bytes32(src: &mut impl Buf) -> Result<Vec<u8>, ProtoError> {
    if src.remaining() < 4 {
        return Err(ProtoError::Truncated);
    }
    let len = src.get_u32_le() as usize;
    if src.remaining() < len {
        return Err(ProtoError::Truncated);
    }
    let mut bytes = vec![0u8; len];
    src.copy_to_slice(&mut bytes);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vstr_roundtrips() {
        let mut buf = Vec::new();
        put_vstr(&mut buf, "/hyperspace/metadata");
        let mut cursor = &buf[..];
        assert_eq!(get_vstr(&mut cursor).unwrap(), "/hyperspace/metadata");
    }

    #[test]
    fn bytes32_roundtrips() {
        let mut buf = Vec::new();
        put_bytes32(&mut buf, &[1, 2, 3, 4]);
        let mut cursor = &buf[..];
        assert_eq!(get_bytes32(&mut cursor).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn truncated_vstr_is_rejected() {
        let mut buf = Vec::new();
        buf.put_u32_le(10);
        buf.put_slice(b"short");
        let mut cursor = &buf[..];
        assert!(matches!(get_vstr(&mut cursor), Err(ProtoError::Truncated)));
    }
}
