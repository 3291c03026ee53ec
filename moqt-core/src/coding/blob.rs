//! Length-prefixed byte blobs: `len:varint | bytes[len]`. Strings and raw
//! payloads both use this shape; `String` gets its own impl so callers
//! don't have to round-trip through `Vec<u8>`.

use super::{Decode, DecodeError, Encode, EncodeError};
use bytes::{Buf, Bytes};

/// A length-prefixed, arbitrary byte blob. Used for object payloads and
/// reason phrases alike.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Blob(pub Bytes);

impl From<Bytes> for Blob {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(b: Vec<u8>) -> Self {
        Self(Bytes::from(b))
    }
}

impl Encode for Blob {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.0.len().encode(w)?;
        w.put_slice(&self.0);
        Ok(())
    }
}

impl Decode for Blob {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let len = usize::decode(r)?;
        Self::decode_remaining(r, len)?;
        Ok(Blob(r.copy_to_bytes(len)))
    }
}

impl Encode for String {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.len().encode(w)?;
        w.put_slice(self.as_bytes());
        Ok(())
    }
}

impl Decode for String {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let len = usize::decode(r)?;
        Self::decode_remaining(r, len)?;
        let mut buf = vec![0u8; len];
        r.copy_to_slice(&mut buf);
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn blob_roundtrip() {
        let mut buf = BytesMut::new();
        let blob = Blob::from(vec![1, 2, 3, 4, 5]);
        blob.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x05, 1, 2, 3, 4, 5]);
        assert_eq!(Blob::decode(&mut buf).unwrap(), blob);
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = BytesMut::new();
        let s = "trackName".to_string();
        s.encode(&mut buf).unwrap();
        assert_eq!(String::decode(&mut buf).unwrap(), s);
    }

    #[test]
    fn blob_needs_more_data() {
        let data: Vec<u8> = vec![0x05, 1, 2];
        let mut buf: Bytes = data.into();
        assert!(matches!(Blob::decode(&mut buf), Err(DecodeError::More(_))));
    }
}
