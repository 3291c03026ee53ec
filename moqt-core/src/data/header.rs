use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// The first bytes of every unidirectional data stream (spec.md §4.2). Only
/// `Subgroup` is mandatory in this core; the other two are recognized so a
/// relay can at least identify and reject/ignore streams it doesn't serve.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamHeaderKind {
    ObjectDatagram = 0x01,
    Subgroup = 0x04,
    Fetch = 0x05,
}

impl Encode for StreamHeaderKind {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u64).encode(w)
    }
}

impl Decode for StreamHeaderKind {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u64::decode(r)? {
            0x01 => Ok(Self::ObjectDatagram),
            0x04 => Ok(Self::Subgroup),
            0x05 => Ok(Self::Fetch),
            v => Err(DecodeError::InvalidHeaderKind(v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        for kind in [
            StreamHeaderKind::ObjectDatagram,
            StreamHeaderKind::Subgroup,
            StreamHeaderKind::Fetch,
        ] {
            let mut buf = BytesMut::new();
            kind.encode(&mut buf).unwrap();
            assert_eq!(StreamHeaderKind::decode(&mut buf).unwrap(), kind);
        }
    }

    #[test]
    fn invalid_kind() {
        let mut buf = bytes::Bytes::from(vec![0x02]);
        assert!(matches!(
            StreamHeaderKind::decode(&mut buf),
            Err(DecodeError::InvalidHeaderKind(2))
        ));
    }
}
