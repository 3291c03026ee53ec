//! Fixed-width trivial integers, serialized in network (big-endian) byte
//! order. These back the u8 priority/flag fields used throughout the
//! message set (publisher/subscriber priority, group order, forward flag).

use super::{Decode, DecodeError, Encode, EncodeError};

impl Encode for u8 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.put_u8(*self);
        Ok(())
    }
}

impl Decode for u8 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;
        Ok(r.get_u8())
    }
}

impl Encode for u16 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.put_u16(*self);
        Ok(())
    }
}

impl Decode for u16 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 2)?;
        Ok(r.get_u16())
    }
}

impl Encode for u32 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.put_u32(*self);
        Ok(())
    }
}

impl Decode for u32 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 4)?;
        Ok(r.get_u32())
    }
}

/// A "trivial" 64-bit integer encoded in 8 bytes, as opposed to `u64`'s
/// `Encode`/`Decode` impls which use the varint encoding. Only used for
/// fields the drafts specify as fixed-width (none in the current message
/// set, but kept for parity with the C++ original's trivial-integer
/// helpers and exercised by tests below).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fixed64(pub u64);

impl Encode for Fixed64 {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.put_u64(self.0);
        Ok(())
    }
}

impl Decode for Fixed64 {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 8)?;
        Ok(Fixed64(r.get_u64()))
    }
}

impl Encode for bool {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.put_u8(u8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u8::decode(r)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode_u8() {
        let mut buf = BytesMut::new();
        let i: u8 = 8;
        i.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x08]);
        assert_eq!(u8::decode(&mut buf).unwrap(), i);
    }

    #[test]
    fn encode_decode_u16() {
        let mut buf = BytesMut::new();
        let i: u16 = 65534;
        i.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0xff, 0xfe]);
        assert_eq!(u16::decode(&mut buf).unwrap(), i);
    }

    #[test]
    fn encode_decode_fixed64() {
        let mut buf = BytesMut::new();
        let v = Fixed64(0x8765432112345678);
        v.encode(&mut buf).unwrap();
        assert_eq!(Fixed64::decode(&mut buf).unwrap(), v);
    }

    #[test]
    fn encode_decode_bool() {
        let mut buf = BytesMut::new();
        true.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x01]);
        assert!(bool::decode(&mut buf).unwrap());
    }

    #[test]
    fn decode_invalid_bool() {
        let data: Vec<u8> = vec![0x02];
        let mut buf: Bytes = data.into();
        assert!(matches!(bool::decode(&mut buf).unwrap_err(), DecodeError::InvalidValue));
    }
}
