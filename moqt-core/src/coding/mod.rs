//! Byte-level wire codec: the QUIC-style variable length integer (C1) plus
//! the composite types (blob, tuple, parameter) built on top of it.

mod blob;
mod hex_dump;
mod integer;
mod param;
mod tuple;
mod varint;

pub use blob::*;
pub use hex_dump::*;
pub use param::*;
pub use tuple::*;
pub use varint::*;

use std::string::FromUtf8Error;

/// Serializes `Self` onto a `bytes::BufMut` sink.
pub trait Encode: Sized {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError>;
}

/// Deserializes `Self` from a `bytes::Buf` source.
///
/// Implementations MUST NOT consume any bytes from `r` unless decoding
/// succeeds; on `DecodeError::More` the caller is expected to buffer more
/// bytes and retry from the same starting position.
pub trait Decode: Sized {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError>;

    /// Fails with `DecodeError::More` if `r` doesn't have `size` bytes left.
    fn decode_remaining<R: bytes::Buf>(r: &R, size: usize) -> Result<(), DecodeError> {
        let remaining = r.remaining();
        if remaining < size {
            Err(DecodeError::More(size - remaining))
        } else {
            Ok(())
        }
    }
}

#[derive(thiserror::Error, Clone, Debug)]
pub enum EncodeError {
    #[error("value too large for varint encoding")]
    ValueTooLarge,

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("message bounds exceeded")]
    MsgBoundsExceeded,

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid value")]
    InvalidValue,

    #[error("short write, {0} bytes remaining")]
    More(usize),
}

#[derive(thiserror::Error, Clone, Debug)]
pub enum DecodeError {
    /// Recoverable: the buffer is short by (at least) this many bytes.
    #[error("need {0} more bytes")]
    More(usize),

    #[error("value too large for 62-bit varint range")]
    ValueTooLarge,

    #[error("invalid message type: {0:#x}")]
    InvalidMessageType(u64),

    #[error("unknown stream header kind: {0:#x}")]
    InvalidHeaderKind(u64),

    #[error("stream header kind {0:?} is recognized but not implemented by this core")]
    UnsupportedStreamKind(crate::data::StreamHeaderKind),

    #[error("invalid filter type: {0}")]
    InvalidFilterType(u64),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("body length mismatch: declared {declared}, parsed {parsed}")]
    FramingError { declared: usize, parsed: usize },

    #[error("duplicate parameter key: {0}")]
    DuplicateParameter(u64),

    #[error("invalid utf8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("invalid value")]
    InvalidValue,
}
