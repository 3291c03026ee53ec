//! The handshake messages exchanged on a fresh control stream before any
//! other control message is sent (spec.md §4.2). Unlike the rest of the
//! control-message set these don't self-frame with a type/length prefix -
//! that framing is supplied uniformly by [`crate::message::Message`], so
//! `ClientSetup`/`ServerSetup` here only carry their bodies.

use crate::coding::{Decode, DecodeError, Encode, EncodeError, Parameters};
use std::fmt;

/// ALPN token a transport must negotiate before this crate's control/data
/// streams make sense on the wire (spec.md §6).
pub const ALPN: &[u8] = b"moq-00";

/// A negotiated protocol version, carried as a varint on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u32);

impl Version {
    pub const DRAFT_11: Version = Version(0xff00000b);
    pub const DRAFT_12: Version = Version(0xff00000c);
    pub const DRAFT_13: Version = Version(0xff00000d);
    pub const DRAFT_14: Version = Version(0xff00000e);
}

impl From<u32> for Version {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<Version> for u32 {
    fn from(v: Version) -> Self {
        v.0
    }
}

impl Encode for Version {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (self.0 as u64).encode(w)
    }
}

impl Decode for Version {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let v = u64::decode(r)?;
        Ok(Self(u32::try_from(v).map_err(|_| DecodeError::InvalidValue)?))
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0xff000000 {
            write!(f, "DRAFT_{:02}", self.0 & 0x00ff_ffff)
        } else {
            self.0.fmt(f)
        }
    }
}

/// A list of versions in preference order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Versions(pub Vec<Version>);

impl Encode for Versions {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.0.len().encode(w)?;
        for v in &self.0 {
            v.encode(w)?;
        }
        Ok(())
    }
}

impl Decode for Versions {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let n = usize::decode(r)?;
        let mut vs = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            vs.push(Version::decode(r)?);
        }
        Ok(Self(vs))
    }
}

impl std::ops::Deref for Versions {
    type Target = Vec<Version>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Version>> for Versions {
    fn from(vs: Vec<Version>) -> Self {
        Self(vs)
    }
}

impl<const N: usize> From<[Version; N]> for Versions {
    fn from(vs: [Version; N]) -> Self {
        Self(vs.to_vec())
    }
}

/// CLIENT_SETUP (0x40): the first message on every control stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSetup {
    pub versions: Versions,
    pub params: Parameters,
}

impl Encode for ClientSetup {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.versions.encode(w)?;
        self.params.encode(w)
    }
}

impl Decode for ClientSetup {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            versions: Versions::decode(r)?,
            params: Parameters::decode(r)?,
        })
    }
}

/// SERVER_SETUP (0x41): the server's reply, naming exactly one version.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerSetup {
    pub selected_version: Version,
    pub params: Parameters,
}

impl Encode for ServerSetup {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.selected_version.encode(w)?;
        self.params.encode(w)
    }
}

impl Decode for ServerSetup {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            selected_version: Version::decode(r)?,
            params: Parameters::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn client_setup_roundtrip() {
        let mut buf = BytesMut::new();
        let msg = ClientSetup {
            versions: Versions(vec![Version::DRAFT_13, Version::DRAFT_14]),
            params: Parameters::new(),
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(ClientSetup::decode(&mut buf).unwrap(), msg);
    }

    #[test]
    fn server_setup_roundtrip() {
        let mut buf = BytesMut::new();
        let msg = ServerSetup {
            selected_version: Version::DRAFT_14,
            params: Parameters::new(),
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(ServerSetup::decode(&mut buf).unwrap(), msg);
    }

    #[test]
    fn version_display_renders_draft_number() {
        assert_eq!(format!("{}", Version::DRAFT_14), "DRAFT_14");
        assert_eq!(format!("{}", Version(7)), "7");
    }
}
