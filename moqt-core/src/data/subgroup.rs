use crate::coding::{Blob, Decode, DecodeError, Encode, EncodeError};
use crate::ids::{GroupId, ObjectId, PublisherPriority, SubGroupId, TrackAlias};

/// First record on a SUBGROUP stream, right after the `StreamHeaderKind`
/// (spec.md §4.2): `track-alias:varint | group-id:varint | subgroup-id:varint
/// | publisher-priority:u8`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubgroupHeader {
    pub track_alias: TrackAlias,
    pub group_id: GroupId,
    pub subgroup_id: SubGroupId,
    pub publisher_priority: PublisherPriority,
}

impl Encode for SubgroupHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.track_alias.encode(w)?;
        self.group_id.encode(w)?;
        self.subgroup_id.encode(w)?;
        self.publisher_priority.encode(w)?;
        Ok(())
    }
}

impl Decode for SubgroupHeader {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            track_alias: TrackAlias::decode(r)?,
            group_id: GroupId::decode(r)?,
            subgroup_id: SubGroupId::decode(r)?,
            publisher_priority: PublisherPriority::decode(r)?,
        })
    }
}

/// One object record on a SUBGROUP stream (spec.md §4.2):
/// `object-id:varint | payload-length:varint | payload[payload-length]`.
/// Repeated for every object in the subgroup; the stream's end (not a
/// count) terminates the sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubgroupObject {
    pub object_id: ObjectId,
    pub payload: Blob,
}

impl Encode for SubgroupObject {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.object_id.encode(w)?;
        self.payload.encode(w)?;
        Ok(())
    }
}

impl Decode for SubgroupObject {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: ObjectId::decode(r)?,
            payload: Blob::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn header_roundtrip() {
        let mut buf = BytesMut::new();
        let h = SubgroupHeader {
            track_alias: TrackAlias(7),
            group_id: GroupId(3),
            subgroup_id: SubGroupId(0),
            publisher_priority: PublisherPriority(128),
        };
        h.encode(&mut buf).unwrap();
        assert_eq!(SubgroupHeader::decode(&mut buf).unwrap(), h);
    }

    #[test]
    fn object_roundtrip_with_payload() {
        let mut buf = BytesMut::new();
        let o = SubgroupObject {
            object_id: ObjectId(42),
            payload: Blob(bytes::Bytes::from_static(b"hello")),
        };
        o.encode(&mut buf).unwrap();
        assert_eq!(SubgroupObject::decode(&mut buf).unwrap(), o);
    }

    #[test]
    fn object_roundtrip_empty_payload() {
        let mut buf = BytesMut::new();
        let o = SubgroupObject {
            object_id: ObjectId(0),
            payload: Blob(bytes::Bytes::new()),
        };
        o.encode(&mut buf).unwrap();
        assert_eq!(SubgroupObject::decode(&mut buf).unwrap(), o);
    }

    #[test]
    fn sequence_of_objects_on_one_stream() {
        let mut buf = BytesMut::new();
        let objs = vec![
            SubgroupObject {
                object_id: ObjectId(0),
                payload: Blob(bytes::Bytes::from_static(b"a")),
            },
            SubgroupObject {
                object_id: ObjectId(1),
                payload: Blob(bytes::Bytes::from_static(b"bb")),
            },
        ];
        for o in &objs {
            o.encode(&mut buf).unwrap();
        }
        for expected in &objs {
            assert_eq!(&SubgroupObject::decode(&mut buf).unwrap(), expected);
        }
        assert_eq!(buf.len(), 0);
    }
}
