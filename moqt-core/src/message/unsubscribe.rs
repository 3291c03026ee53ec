use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::ids::SubscribeId;

/// UNSUBSCRIBE (0x0A): sent by the subscriber to terminate a subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct Unsubscribe {
    pub subscribe_id: SubscribeId,
}

impl Encode for Unsubscribe {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.subscribe_id.encode(w)
    }
}

impl Decode for Unsubscribe {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            subscribe_id: SubscribeId::decode(r)?,
        })
    }
}
