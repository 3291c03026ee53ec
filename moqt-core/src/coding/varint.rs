use super::{Decode, DecodeError, Encode, EncodeError};

/// A QUIC-style (RFC 9000 §16) variable length integer in `[0, 2^62)`.
///
/// The top two bits of the first byte select the length class:
/// `00` -> 1 byte, `01` -> 2 bytes, `10` -> 4 bytes, `11` -> 8 bytes. The
/// remaining bits of the first byte, plus any trailing bytes, hold the
/// value in network byte order. Encoding always picks the minimal class
/// for the value's magnitude - this is what makes `decode(encode(v)) == v`
/// a round trip rather than merely an inverse.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl VarInt {
    pub const MAX: u64 = (1 << 62) - 1;

    pub fn new(v: u64) -> Result<Self, EncodeError> {
        if v > Self::MAX {
            Err(EncodeError::ValueTooLarge)
        } else {
            Ok(Self(v))
        }
    }

    pub fn from_u32(v: u32) -> Self {
        Self(v as u64)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Number of bytes `v` would serialize to.
    pub fn encoded_len(v: u64) -> usize {
        match v {
            0..=0x3f => 1,
            0x40..=0x3fff => 2,
            0x4000..=0x3fff_ffff => 4,
            _ => 8,
        }
    }
}

impl From<VarInt> for u64 {
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl TryFrom<u64> for VarInt {
    type Error = EncodeError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl Encode for VarInt {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let v = self.0;
        match VarInt::encoded_len(v) {
            1 => w.put_u8(v as u8),
            2 => w.put_u16(0x4000 | v as u16),
            4 => w.put_u32(0x8000_0000 | v as u32),
            _ => w.put_u64(0xc000_0000_0000_0000 | v),
        }
        Ok(())
    }
}

impl Decode for VarInt {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;

        // Peek the first byte without consuming, so a short buffer for the
        // remaining length-class bytes leaves `r` untouched.
        let chunk = r.chunk();
        let first = chunk[0];
        let tag = first >> 6;
        let len = 1usize << tag;

        Self::decode_remaining(r, len)?;

        let v = match len {
            1 => (r.get_u8() & 0x3f) as u64,
            2 => (r.get_u16() & 0x3fff) as u64,
            4 => (r.get_u32() & 0x3fff_ffff) as u64,
            _ => r.get_u64() & 0x3fff_ffff_ffff_ffff,
        };

        Ok(VarInt(v))
    }
}

/// Encodes `v: u64` directly as a varint; the common case callers want.
pub fn encode_varint<W: bytes::BufMut>(v: u64, w: &mut W) -> Result<(), EncodeError> {
    VarInt::new(v)?.encode(w)
}

/// Decodes a varint and returns it as a plain `u64`.
pub fn decode_varint<R: bytes::Buf>(r: &mut R) -> Result<u64, DecodeError> {
    Ok(VarInt::decode(r)?.into_inner())
}

impl Encode for u64 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        encode_varint(*self, w)
    }
}

impl Decode for u64 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        decode_varint(r)
    }
}

impl Encode for usize {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        encode_varint(*self as u64, w)
    }
}

impl Decode for usize {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let v = decode_varint(r)?;
        Ok(v as usize)
    }
}
