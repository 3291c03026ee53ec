use crate::coding::{Decode, DecodeError, Encode, EncodeError, Tuple};

/// TRACK_STATUS_REQUEST (0x0D): a point lookup into the publisher's data
/// store, independent of any subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackStatusRequest {
    pub track_namespace: Tuple,
    pub track_name: String,
}

impl Encode for TrackStatusRequest {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.track_namespace.encode(w)?;
        self.track_name.encode(w)?;
        Ok(())
    }
}

impl Decode for TrackStatusRequest {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            track_namespace: Tuple::decode(r)?,
            track_name: String::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        let mut buf = BytesMut::new();
        let msg = TrackStatusRequest {
            track_namespace: Tuple::from(vec!["ns"]),
            track_name: "track".to_string(),
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(TrackStatusRequest::decode(&mut buf).unwrap(), msg);
    }
}
