//! Incremental deserializer (spec.md §4.3).
//!
//! Input arrives as a sequence of opaque buffers of arbitrary size; a single
//! message may span many `append` calls and one call may deliver many
//! messages. Both flavours below follow the same shape: accumulate into an
//! append-only `BytesMut`, try to decode as many complete messages as the
//! buffer holds, hand each to the caller-supplied handler, and leave any
//! trailing partial message buffered for the next `append`. Neither type is
//! thread-safe; callers must synchronize around `append` themselves.

mod control;
mod data;

pub use control::*;
pub use data::*;
