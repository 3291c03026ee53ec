//! Parameter = `type:varint | value:blob`. The only standardized parameter
//! kind this core understands is delivery-timeout (a varint millisecond
//! count); unrecognized parameter types are preserved opaquely so a relay
//! can forward them without understanding them.

use super::{decode_varint, encode_varint, Blob, Decode, DecodeError, Encode, EncodeError};
use std::collections::HashMap;

/// Key for the delivery-timeout parameter (spec.md §4.2).
pub const PARAM_DELIVERY_TIMEOUT: u64 = 0x02;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Parameters(pub HashMap<u64, Blob>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: u64) -> Option<&Blob> {
        self.0.get(&key)
    }

    pub fn set(&mut self, key: u64, value: Blob) {
        self.0.insert(key, value);
    }

    pub fn delivery_timeout(&self) -> Result<Option<u64>, DecodeError> {
        match self.0.get(&PARAM_DELIVERY_TIMEOUT) {
            None => Ok(None),
            Some(blob) => {
                let mut slice = blob.0.clone();
                Ok(Some(decode_varint(&mut slice)?))
            }
        }
    }

    pub fn set_delivery_timeout(&mut self, ms: u64) -> Result<(), EncodeError> {
        let mut buf = Vec::new();
        encode_varint(ms, &mut buf)?;
        self.set(PARAM_DELIVERY_TIMEOUT, Blob::from(buf));
        Ok(())
    }
}

impl Encode for Parameters {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.0.len().encode(w)?;
        for (key, value) in &self.0 {
            key.encode(w)?;
            value.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for Parameters {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let n = usize::decode(r)?;
        let mut map = HashMap::with_capacity(n.min(1024));
        for _ in 0..n {
            let key = u64::decode(r)?;
            let value = Blob::decode(r)?;
            if map.insert(key, value).is_some() {
                return Err(DecodeError::DuplicateParameter(key));
            }
        }
        Ok(Parameters(map))
    }
}
