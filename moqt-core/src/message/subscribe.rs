use super::FilterType;
use crate::coding::{Decode, DecodeError, Encode, EncodeError, Parameters, Tuple};
use crate::ids::{Location, SubscribeId, SubscriberPriority, TrackAlias};
use crate::GroupOrder;

/// The body shared by a standalone SUBSCRIBE message and each element of a
/// BATCH_SUBSCRIBE (spec.md §4.2: "n x SUBSCRIBE body (no per-element
/// header)").
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeBody {
    pub subscribe_id: SubscribeId,
    pub track_alias: TrackAlias,
    pub track_namespace: Tuple,
    pub track_name: String,
    pub subscriber_priority: SubscriberPriority,
    pub group_order: GroupOrder,
    pub filter_type: FilterType,
    pub start: Option<Location>,
    pub end: Option<Location>,
    pub params: Parameters,
}

impl Encode for SubscribeBody {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.subscribe_id.encode(w)?;
        self.track_alias.encode(w)?;
        self.track_namespace.encode(w)?;
        self.track_name.encode(w)?;
        self.subscriber_priority.encode(w)?;
        self.group_order.encode(w)?;
        self.filter_type.encode(w)?;

        if self.filter_type.has_start() {
            self.start
                .as_ref()
                .ok_or_else(|| EncodeError::MissingField("start".into()))?
                .encode(w)?;
        } else if self.start.is_some() {
            return Err(EncodeError::InvalidValue);
        }

        if self.filter_type.has_end() {
            self.end
                .as_ref()
                .ok_or_else(|| EncodeError::MissingField("end".into()))?
                .encode(w)?;
        } else if self.end.is_some() {
            return Err(EncodeError::InvalidValue);
        }

        self.params.encode(w)?;
        Ok(())
    }
}

impl Decode for SubscribeBody {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let subscribe_id = SubscribeId::decode(r)?;
        let track_alias = TrackAlias::decode(r)?;
        let track_namespace = Tuple::decode(r)?;
        let track_name = String::decode(r)?;
        let subscriber_priority = SubscriberPriority::decode(r)?;
        let group_order = GroupOrder::decode(r)?;
        let filter_type = FilterType::decode(r)?;

        let start = filter_type.has_start().then(|| Location::decode(r)).transpose()?;
        let end = filter_type.has_end().then(|| Location::decode(r)).transpose()?;
        let params = Parameters::decode(r)?;

        Ok(Self {
            subscribe_id,
            track_alias,
            track_namespace,
            track_name,
            subscriber_priority,
            group_order,
            filter_type,
            start,
            end,
            params,
        })
    }
}

/// SUBSCRIBE (0x03): sent by a subscriber to request objects of a track.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscribe(pub SubscribeBody);

impl Encode for Subscribe {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.0.encode(w)
    }
}

impl Decode for Subscribe {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self(SubscribeBody::decode(r)?))
    }
}

impl std::ops::Deref for Subscribe {
    type Target = SubscribeBody;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn sample(filter_type: FilterType, start: Option<Location>, end: Option<Location>) -> Subscribe {
        let mut params = Parameters::new();
        params.set_delivery_timeout(100).unwrap();

        Subscribe(SubscribeBody {
            subscribe_id: SubscribeId(0x1234_5678),
            track_alias: TrackAlias(0x8765_4321),
            track_namespace: Tuple::from(vec!["namespace1", "namespace2"]),
            track_name: "trackName".to_string(),
            subscriber_priority: SubscriberPriority(0x12),
            group_order: GroupOrder::Descending,
            filter_type,
            start,
            end,
            params,
        })
    }

    #[test]
    fn absolute_range_roundtrip() {
        let mut buf = BytesMut::new();
        let msg = sample(
            FilterType::AbsoluteRange,
            Some(Location::new(0x5678, 0x1234)),
            Some(Location::new(0x5678, 0x1234)),
        );
        msg.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn latest_group_has_no_location_fields() {
        let mut buf = BytesMut::new();
        let msg = sample(FilterType::LatestGroup, None, None);
        msg.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.start.is_none());
        assert!(decoded.end.is_none());
    }

    #[test]
    fn absolute_start_rejects_missing_start() {
        let mut buf = BytesMut::new();
        let msg = sample(FilterType::AbsoluteStart, None, None);
        assert!(matches!(msg.encode(&mut buf), Err(EncodeError::MissingField(_))));
    }

    #[test]
    fn no_parameters_subscribe() {
        let mut buf = BytesMut::new();
        let mut msg = sample(FilterType::LatestObject, None, None);
        msg.0.params = Parameters::new();
        msg.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert!(decoded.params.0.is_empty());
    }
}
