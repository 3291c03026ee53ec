//! Native I/O for `moqt-core` (SPEC_FULL.md §2): a `quinn`/`rustls`
//! implementation of [`moqt_core::transport::Transport`], plus the TLS
//! certificate plumbing a standalone binary needs to bind a QUIC endpoint.

pub mod quic;
pub mod tls;

pub use quic::{Endpoint, QuicTransport};
