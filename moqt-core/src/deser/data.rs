use crate::coding::{Decode, DecodeError};
use crate::data::{StreamHeaderKind, SubgroupHeader, SubgroupObject};
use bytes::{Buf, BytesMut};

/// One parsed record off a unidirectional data stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataStreamEvent {
    SubgroupHeader(SubgroupHeader),
    Object(SubgroupObject),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    ReadingHeaderKind,
    ReadingSubgroupHeader,
    ReadingObject,
}

/// Drives `ReadingHeaderKind -> ReadingSubgroupHeader -> ReadingObject ->
/// ReadingObject ...` over one data stream's accumulated bytes (spec.md
/// §4.3). Only the SUBGROUP stream kind is implemented by this core; any
/// other recognized kind is a fatal [`DecodeError::UnsupportedStreamKind`]
/// for that stream.
pub struct DataDeserializer<F: FnMut(DataStreamEvent)> {
    buf: BytesMut,
    state: State,
    handler: F,
}

impl<F: FnMut(DataStreamEvent)> DataDeserializer<F> {
    pub fn new(handler: F) -> Self {
        Self {
            buf: BytesMut::new(),
            state: State::ReadingHeaderKind,
            handler,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.buf.extend_from_slice(bytes);

        loop {
            let mut cursor = &self.buf[..];
            let before = cursor.remaining();

            let advance_by = match self.state {
                State::ReadingHeaderKind => match StreamHeaderKind::decode(&mut cursor) {
                    Ok(StreamHeaderKind::Subgroup) => {
                        self.state = State::ReadingSubgroupHeader;
                        before - cursor.remaining()
                    }
                    Ok(other) => return Err(DecodeError::UnsupportedStreamKind(other)),
                    Err(DecodeError::More(_)) => return Ok(()),
                    Err(e) => return Err(e),
                },
                State::ReadingSubgroupHeader => match SubgroupHeader::decode(&mut cursor) {
                    Ok(header) => {
                        let consumed = before - cursor.remaining();
                        self.buf.advance(consumed);
                        self.state = State::ReadingObject;
                        (self.handler)(DataStreamEvent::SubgroupHeader(header));
                        continue;
                    }
                    Err(DecodeError::More(_)) => return Ok(()),
                    Err(e) => return Err(e),
                },
                State::ReadingObject => match SubgroupObject::decode(&mut cursor) {
                    Ok(object) => {
                        let consumed = before - cursor.remaining();
                        self.buf.advance(consumed);
                        (self.handler)(DataStreamEvent::Object(object));
                        continue;
                    }
                    Err(DecodeError::More(_)) => return Ok(()),
                    Err(e) => return Err(e),
                },
            };

            self.buf.advance(advance_by);
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{Blob, Encode};
    use crate::ids::{GroupId, ObjectId, PublisherPriority, SubGroupId, TrackAlias};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn wire(header: &SubgroupHeader, objects: &[SubgroupObject]) -> BytesMut {
        let mut buf = BytesMut::new();
        StreamHeaderKind::Subgroup.encode(&mut buf).unwrap();
        header.encode(&mut buf).unwrap();
        for o in objects {
            o.encode(&mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn header_then_objects_one_shot() {
        let header = SubgroupHeader {
            track_alias: TrackAlias(1),
            group_id: GroupId(0),
            subgroup_id: SubGroupId(0),
            publisher_priority: PublisherPriority(0),
        };
        let objects = vec![
            SubgroupObject {
                object_id: ObjectId(0),
                payload: Blob(bytes::Bytes::from_static(b"a")),
            },
            SubgroupObject {
                object_id: ObjectId(1),
                payload: Blob(bytes::Bytes::from_static(b"b")),
            },
        ];
        let buf = wire(&header, &objects);

        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let mut d = DataDeserializer::new(move |ev| e.borrow_mut().push(ev));
        d.append(&buf).unwrap();

        let got = events.borrow();
        assert_eq!(got[0], DataStreamEvent::SubgroupHeader(header));
        assert_eq!(got[1], DataStreamEvent::Object(objects[0].clone()));
        assert_eq!(got[2], DataStreamEvent::Object(objects[1].clone()));
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn byte_at_a_time_still_parses() {
        let header = SubgroupHeader {
            track_alias: TrackAlias(7),
            group_id: GroupId(3),
            subgroup_id: SubGroupId(1),
            publisher_priority: PublisherPriority(9),
        };
        let objects = vec![SubgroupObject {
            object_id: ObjectId(5),
            payload: Blob(bytes::Bytes::from_static(b"hello world")),
        }];
        let buf = wire(&header, &objects);

        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let mut d = DataDeserializer::new(move |ev| e.borrow_mut().push(ev));
        for byte in buf.iter() {
            d.append(&[*byte]).unwrap();
        }

        let got = events.borrow();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], DataStreamEvent::SubgroupHeader(header));
        assert_eq!(got[1], DataStreamEvent::Object(objects[0].clone()));
    }

    #[test]
    fn unsupported_kind_is_fatal() {
        let mut buf = BytesMut::new();
        StreamHeaderKind::Fetch.encode(&mut buf).unwrap();
        let mut d = DataDeserializer::new(|_| ());
        assert!(matches!(
            d.append(&buf),
            Err(DecodeError::UnsupportedStreamKind(StreamHeaderKind::Fetch))
        ));
    }
}
