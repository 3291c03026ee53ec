//! Control messages sent over the bidirectional control stream (spec.md
//! §4.2). Every message is framed `type:varint | length:varint | body`,
//! where `length` is the exact body length - callers get this for free
//! from the [`Message`] wrapper, which backpatches the length after
//! encoding the body into a scratch buffer (the same "mock serialize, then
//! backpatch" approach the teacher's `message/mod.rs` macro uses, adapted
//! to a varint rather than `u16` length).

mod batch_subscribe;
mod filter_type;
mod subscribe;
mod subscribe_error;
mod subscribe_update;
mod track_status_request;
mod unsubscribe;

pub use batch_subscribe::*;
pub use filter_type::*;
pub use subscribe::*;
pub use subscribe_error::*;
pub use subscribe_update::*;
pub use track_status_request::*;
pub use unsubscribe::*;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::setup::{ClientSetup, ServerSetup};
use std::fmt;

macro_rules! message_types {
    {$($name:ident = $val:expr,)*} => {
        /// All control message types this core understands.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Message {
            $($name($name)),*
        }

        impl Message {
            pub fn id(&self) -> u64 {
                match self {
                    $(Self::$name(_) => $val,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$name(_) => stringify!($name),)*
                }
            }
        }

        $(impl From<$name> for Message {
            fn from(m: $name) -> Self {
                Message::$name(m)
            }
        })*

        impl Decode for Message {
            fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
                // Peek type+length without consuming: if the body isn't
                // fully buffered yet we must leave `r` untouched so the
                // caller can retry once more bytes arrive.
                let mut peek = std::io::Cursor::new(r.chunk());
                let t = u64::decode(&mut peek)?;
                let len = usize::decode(&mut peek)?;
                let header_len = peek.position() as usize;

                Self::decode_remaining(r, header_len + len)?;

                r.advance(header_len);
                let mut body = r.copy_to_bytes(len);
                let start_remaining = body.remaining();

                let msg = match t {
                    $($val => Self::$name($name::decode(&mut body)?),)*
                    _ => return Err(DecodeError::InvalidMessageType(t)),
                };

                let parsed = start_remaining - body.remaining();
                if parsed != len {
                    return Err(DecodeError::FramingError { declared: len, parsed });
                }

                Ok(msg)
            }
        }

        impl Encode for Message {
            fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
                self.id().encode(w)?;

                let mut body = Vec::new();
                match self {
                    $(Self::$name(m) => m.encode(&mut body)?,)*
                }

                body.len().encode(w)?;
                w.put_slice(&body);
                Ok(())
            }
        }

        impl fmt::Display for Message {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }
    }
}

message_types! {
    ClientSetup = 0x40,
    ServerSetup = 0x41,
    SubscribeUpdate = 0x02,
    Subscribe = 0x03,
    SubscribeError = 0x05,
    Unsubscribe = 0x0a,
    TrackStatusRequest = 0x0d,
    BatchSubscribe = 0x11,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Parameters;
    use crate::ids::{SubscribeId, SubscriberPriority, TrackAlias};
    use crate::setup::{Version, Versions};
    use crate::GroupOrder;
    use bytes::{Buf, BytesMut};

    #[test]
    fn client_setup_wire_example() {
        let mut buf = BytesMut::new();
        let msg: Message = ClientSetup {
            versions: Versions(vec![Version(0x1234_5678), Version(0x8765_4321)]),
            params: Parameters::new(),
        }
        .into();
        msg.encode(&mut buf).unwrap();

        // type=0x40 (2-byte varint: 0x40 0x40), length=0x0e (1 byte),
        // then the 14-byte body. Total 17 bytes (spec.md §8 scenario 2).
        assert_eq!(buf.len(), 17);
        assert_eq!(&buf[..2], &[0x40, 0x40]);
        assert_eq!(buf[2], 0x0e);

        let decoded = Message::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unknown_type_is_fatal_for_stream() {
        let mut buf = BytesMut::new();
        // type=0x7f (unallocated), length=0
        0x7fu64.encode(&mut buf).unwrap();
        0usize.encode(&mut buf).unwrap();
        assert!(matches!(
            Message::decode(&mut buf.freeze()),
            Err(DecodeError::InvalidMessageType(0x7f))
        ));
    }

    #[test]
    fn partial_buffer_does_not_consume() {
        let mut full = BytesMut::new();
        let msg: Message = Unsubscribe {
            subscribe_id: SubscribeId(99),
        }
        .into();
        msg.encode(&mut full).unwrap();

        // Feed one byte at a time; only the final feed should succeed,
        // and it must consume exactly the encoded length.
        let total = full.len();
        let bytes = full.freeze();
        for split in 0..total {
            let mut partial = bytes.slice(0..split);
            assert!(Message::decode(&mut partial).is_err());
        }
        let mut complete = bytes.clone();
        let decoded = Message::decode(&mut complete).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(complete.remaining(), 0);
    }

    #[test]
    fn subscribe_round_trip_from_spec_scenario() {
        let mut buf = BytesMut::new();
        let mut params = Parameters::new();
        params.set_delivery_timeout(100).unwrap();

        let msg: Message = Subscribe(SubscribeBody {
            subscribe_id: SubscribeId(0x1234_5678),
            track_alias: TrackAlias(0x8765_4321),
            track_namespace: crate::coding::Tuple::from(vec!["namespace1", "namespace2"]),
            track_name: "trackName".to_string(),
            subscriber_priority: SubscriberPriority(0x12),
            group_order: GroupOrder::Descending,
            filter_type: FilterType::AbsoluteRange,
            start: Some(crate::ids::Location::new(0x5678, 0x1234)),
            end: Some(crate::ids::Location::new(0x5678, 0x1234)),
            params,
        })
        .into();

        msg.encode(&mut buf).unwrap();
        let decoded = Message::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, msg);
    }
}
