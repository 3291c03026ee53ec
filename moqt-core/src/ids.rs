//! Strongly-typed identifiers (spec.md §3, §9 "Strong typing of IDs").
//!
//! `ObjectId`, `GroupId`, `SubGroupId`, `TrackAlias`, `PublisherPriority`
//! and `SubscriberPriority` each wrap a plain integer so that arithmetic
//! and comparison only ever happen within one kind - the compiler catches
//! an accidental `group_id + object_id` at the call site instead of at
//! runtime.

use crate::coding::{Decode, DecodeError, Encode, EncodeError, Tuple};
use std::fmt;
use std::sync::Arc;

macro_rules! wrapped_id {
    ($name:ident, $repr:ty) => {
        #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $repr);

        impl $name {
            pub const fn new(v: $repr) -> Self {
                Self(v)
            }

            pub fn get(self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Encode for $name {
            fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
                self.0.encode(w)
            }
        }

        impl Decode for $name {
            fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
                Ok(Self(<$repr>::decode(r)?))
            }
        }
    };
}

wrapped_id!(ObjectId, u64);
wrapped_id!(GroupId, u64);
wrapped_id!(SubGroupId, u64);
wrapped_id!(TrackAlias, u64);
wrapped_id!(SubscribeId, u64);
wrapped_id!(PublisherPriority, u8);
wrapped_id!(SubscriberPriority, u8);

impl ObjectId {
    /// spec.md §9: the subgroup boundary encoding reserves the high bit of
    /// the 64-bit id as an end-marker, so producers MUST reject ids at or
    /// above 2^63.
    pub const MAX: u64 = (1 << 63) - 1;

    pub fn checked(v: u64) -> Option<Self> {
        (v <= Self::MAX).then_some(Self(v))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum GroupOrder {
    #[default]
    Publisher = 0,
    Ascending = 1,
    Descending = 2,
}

impl Encode for GroupOrder {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u8).encode(w)
    }
}

impl Decode for GroupOrder {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0 => Ok(Self::Publisher),
            1 => Ok(Self::Ascending),
            2 => Ok(Self::Descending),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// (namespace, name) - immutable, cheaply hashable, large enough that it
/// is always passed by shared reference (spec.md §3).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TrackIdentifier {
    pub namespace: Tuple,
    pub name: String,
}

impl TrackIdentifier {
    pub fn new(namespace: Tuple, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            namespace,
            name: name.into(),
        })
    }
}

impl fmt::Display for TrackIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.namespace.0, self.name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct GroupIdentifier {
    pub track: Arc<TrackIdentifier>,
    pub group_id: GroupId,
}

impl fmt::Display for GroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.group_id)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObjectIdentifier {
    pub group: GroupIdentifier,
    pub object_id: ObjectId,
}

impl ObjectIdentifier {
    pub fn track(&self) -> &Arc<TrackIdentifier> {
        &self.group.track
    }

    pub fn group_id(&self) -> GroupId {
        self.group.group_id
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.object_id)
    }
}

/// A (group, object) pair as it appears on the wire in SUBSCRIBE's
/// optional start/end fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location {
    pub group_id: GroupId,
    pub object_id: ObjectId,
}

impl Location {
    pub fn new(group_id: u64, object_id: u64) -> Self {
        Self {
            group_id: GroupId(group_id),
            object_id: ObjectId(object_id),
        }
    }
}

impl Encode for Location {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.group_id.encode(w)?;
        self.object_id.encode(w)
    }
}

impl Decode for Location {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            group_id: GroupId::decode(r)?,
            object_id: ObjectId::decode(r)?,
        })
    }
}
