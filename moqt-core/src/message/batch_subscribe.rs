use super::SubscribeBody;
use crate::coding::{Decode, DecodeError, Encode, EncodeError, Tuple};

/// BATCH_SUBSCRIBE (0x11): a namespace prefix shared by `n` SUBSCRIBE
/// bodies, each encoded without its own type/length header (spec.md §4.2).
/// `n = 0` is legal and yields zero subscriptions (spec.md §8).
#[derive(Clone, Debug, PartialEq)]
pub struct BatchSubscribe {
    pub namespace_prefix: Tuple,
    pub subscribes: Vec<SubscribeBody>,
}

impl Encode for BatchSubscribe {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.namespace_prefix.encode(w)?;
        self.subscribes.len().encode(w)?;
        for body in &self.subscribes {
            body.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for BatchSubscribe {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let namespace_prefix = Tuple::decode(r)?;
        let n = usize::decode(r)?;
        let mut subscribes = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            subscribes.push(SubscribeBody::decode(r)?);
        }
        Ok(Self {
            namespace_prefix,
            subscribes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Parameters;
    use crate::ids::{SubscribeId, SubscriberPriority, TrackAlias};
    use crate::message::FilterType;
    use crate::GroupOrder;
    use bytes::BytesMut;

    fn body(id: u64) -> SubscribeBody {
        SubscribeBody {
            subscribe_id: SubscribeId(id),
            track_alias: TrackAlias(id),
            track_namespace: Tuple::from(vec!["ns", "leaf"]),
            track_name: format!("track{id}"),
            subscriber_priority: SubscriberPriority(0),
            group_order: GroupOrder::Ascending,
            filter_type: FilterType::LatestGroup,
            start: None,
            end: None,
            params: Parameters::new(),
        }
    }

    #[test]
    fn empty_batch_is_legal() {
        let mut buf = BytesMut::new();
        let msg = BatchSubscribe {
            namespace_prefix: Tuple::from(vec!["ns"]),
            subscribes: vec![],
        };
        msg.encode(&mut buf).unwrap();
        let decoded = BatchSubscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.subscribes.is_empty());
    }

    #[test]
    fn multiple_members_share_prefix() {
        let mut buf = BytesMut::new();
        let msg = BatchSubscribe {
            namespace_prefix: Tuple::from(vec!["ns"]),
            subscribes: vec![body(1), body(2), body(3)],
        };
        msg.encode(&mut buf).unwrap();
        let decoded = BatchSubscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.subscribes.len(), 3);
        for s in &decoded.subscribes {
            assert!(msg.namespace_prefix.is_prefix_of(&s.track_namespace));
        }
    }
}
