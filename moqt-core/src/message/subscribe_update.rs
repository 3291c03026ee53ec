use crate::coding::{Decode, DecodeError, Encode, EncodeError, Parameters};
use crate::ids::{GroupId, SubscribeId, SubscriberPriority};

/// SUBSCRIBE_UPDATE (0x02): narrows or re-prioritizes a live subscription
/// without a new SUBSCRIBE handshake (spec.md §4.2).
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeUpdate {
    pub subscribe_id: SubscribeId,
    pub start_group: GroupId,
    pub start_object: crate::ids::ObjectId,
    pub end_group: GroupId,
    pub subscriber_priority: SubscriberPriority,
    pub forward: bool,
    pub params: Parameters,
}

impl Encode for SubscribeUpdate {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.subscribe_id.encode(w)?;
        self.start_group.encode(w)?;
        self.start_object.encode(w)?;
        self.end_group.encode(w)?;
        self.subscriber_priority.encode(w)?;
        self.forward.encode(w)?;
        self.params.encode(w)?;
        Ok(())
    }
}

impl Decode for SubscribeUpdate {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            subscribe_id: SubscribeId::decode(r)?,
            start_group: GroupId::decode(r)?,
            start_object: crate::ids::ObjectId::decode(r)?,
            end_group: GroupId::decode(r)?,
            subscriber_priority: SubscriberPriority::decode(r)?,
            forward: bool::decode(r)?,
            params: Parameters::decode(r)?,
        })
    }
}
