use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Which objects a SUBSCRIBE wants, and therefore which optional
/// `Location` fields its body carries (spec.md §4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterType {
    LatestGroup = 1,
    LatestObject = 2,
    AbsoluteStart = 3,
    AbsoluteRange = 4,
    LatestPerGroupInTrack = 5,
}

impl FilterType {
    pub fn has_start(self) -> bool {
        matches!(self, Self::AbsoluteStart | Self::AbsoluteRange)
    }

    pub fn has_end(self) -> bool {
        matches!(self, Self::AbsoluteRange)
    }
}

impl Encode for FilterType {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u64).encode(w)
    }
}

impl Decode for FilterType {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u64::decode(r)? {
            1 => Ok(Self::LatestGroup),
            2 => Ok(Self::LatestObject),
            3 => Ok(Self::AbsoluteStart),
            4 => Ok(Self::AbsoluteRange),
            5 => Ok(Self::LatestPerGroupInTrack),
            v => Err(DecodeError::InvalidFilterType(v)),
        }
    }
}
