//! Tuple = `n:varint | n x blob`. The track namespace is the only tuple in
//! this message set, but the shape is kept generic as the teacher's
//! `coding/tuple.rs` does for its namespace type.

use super::{Blob, Decode, DecodeError, Encode, EncodeError};

/// An ordered sequence of string components, e.g. a track namespace.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Tuple(pub Vec<String>);

impl Tuple {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    /// True if `self` is a prefix of `other` (component-wise), used by
    /// BATCH_SUBSCRIBE to validate that member SUBSCRIBEs share the batch's
    /// announced namespace prefix.
    pub fn is_prefix_of(&self, other: &Tuple) -> bool {
        self.0.len() <= other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Encode for Tuple {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.0.len().encode(w)?;
        for part in &self.0 {
            Blob::from(part.clone().into_bytes()).encode(w)?;
        }
        Ok(())
    }
}

impl Decode for Tuple {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let n = usize::decode(r)?;
        let mut parts = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            let blob = Blob::decode(r)?;
            parts.push(String::from_utf8(blob.0.to_vec())?);
        }
        Ok(Tuple(parts))
    }
}

impl From<Vec<&str>> for Tuple {
    fn from(parts: Vec<&str>) -> Self {
        Self(parts.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        let mut buf = BytesMut::new();
        let t = Tuple::from(vec!["namespace1", "namespace2"]);
        t.encode(&mut buf).unwrap();
        assert_eq!(Tuple::decode(&mut buf).unwrap(), t);
    }

    #[test]
    fn empty_tuple() {
        let mut buf = BytesMut::new();
        let t = Tuple::default();
        t.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x00]);
        assert_eq!(Tuple::decode(&mut buf).unwrap(), t);
    }

    #[test]
    fn prefix_matching() {
        let prefix = Tuple::from(vec!["a"]);
        let full = Tuple::from(vec!["a", "b"]);
        assert!(prefix.is_prefix_of(&full));
        assert!(!full.is_prefix_of(&prefix));
    }
}
