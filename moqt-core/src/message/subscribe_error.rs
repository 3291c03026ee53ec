use crate::coding::{Blob, Decode, DecodeError, Encode, EncodeError};
use crate::ids::{SubscribeId, TrackAlias};

/// SUBSCRIBE_ERROR (0x05): sent by the publisher side to reject a
/// SUBSCRIBE, or emitted by the relay's subscription engine when a
/// requested group/object cannot exist (spec.md §4.6, §7).
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeError {
    pub subscribe_id: SubscribeId,
    pub error_code: u64,
    pub reason_phrase: Blob,
    pub track_alias: TrackAlias,
}

impl Encode for SubscribeError {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.subscribe_id.encode(w)?;
        self.error_code.encode(w)?;
        self.reason_phrase.encode(w)?;
        self.track_alias.encode(w)?;
        Ok(())
    }
}

impl Decode for SubscribeError {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            subscribe_id: SubscribeId::decode(r)?,
            error_code: u64::decode(r)?,
            reason_phrase: Blob::decode(r)?,
            track_alias: TrackAlias::decode(r)?,
        })
    }
}

/// Standard error codes used by SUBSCRIBE_ERROR (spec.md §7 taxonomy,
/// mapped onto the wire).
pub mod error_code {
    pub const TRACK_DOES_NOT_EXIST: u64 = 0x00;
    pub const GROUP_DOES_NOT_EXIST: u64 = 0x01;
    pub const INTERNAL_ERROR: u64 = 0x02;
    pub const OBJECT_DOES_NOT_EXIST: u64 = 0x03;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn roundtrip() {
        let mut buf = BytesMut::new();
        let msg = SubscribeError {
            subscribe_id: SubscribeId(1),
            error_code: error_code::TRACK_DOES_NOT_EXIST,
            reason_phrase: Blob::from(b"no such track".to_vec()),
            track_alias: TrackAlias(2),
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(SubscribeError::decode(&mut buf).unwrap(), msg);
    }
}
