//! The external transport boundary (spec.md §6). This crate never opens a
//! socket or speaks TLS; an embedder (e.g. `moqt-native`, backed by
//! `quinn`) implements [`Transport`] and drives the core through
//! [`TransportHandler`] as connection/stream events arrive.

use bytes::Bytes;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection {0} is no longer open")]
    ConnectionClosed(ConnectionId),

    #[error("stream {0} is no longer open")]
    StreamClosed(StreamId),

    #[error("transport-level error: {0}")]
    Other(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamDirection {
    Unidirectional,
    Bidirectional,
}

#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    Connected,
    ShutdownInitiatedByTransport,
    ShutdownInitiatedByPeer,
    ShutdownComplete,
    PeerStreamStarted {
        stream: StreamId,
        direction: StreamDirection,
    },
    Resumed,
}

/// What the core tells the transport to do with a receive buffer once its
/// callback returns (spec.md §6 "deferred-completion idiom"): `Pending`
/// means the core is still holding borrowed bytes and will call
/// `Transport::receive_complete` explicitly later; `Consumed` means the
/// transport may reclaim the buffer immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceiveDisposition {
    Consumed,
    Pending,
}

#[derive(Clone, Debug)]
pub enum StreamEvent {
    StartComplete,
    Receive(Bytes),
    SendComplete { context: u64 },
    PeerSendShutdown,
    ShutdownComplete,
}

/// Implemented by the core (connection.rs/engine.rs glue in practice) and
/// driven by the transport as I/O events arrive. Callbacks MUST NOT block.
pub trait TransportHandler: Send + Sync {
    fn on_connection_event(&self, conn: ConnectionId, event: ConnectionEvent);

    fn on_stream_event(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        event: StreamEvent,
    ) -> ReceiveDisposition;
}

/// Implemented by the embedder (`moqt-native`'s `quinn` backend). The core
/// calls these to drive outbound I/O; it never touches sockets directly.
pub trait Transport: Send + Sync {
    fn open_stream(
        &self,
        conn: ConnectionId,
        direction: StreamDirection,
        priority: u8,
    ) -> Result<StreamId, TransportError>;

    /// `context` is echoed back on `StreamEvent::SendComplete` so the
    /// caller can correlate completions without the transport needing to
    /// understand message framing.
    fn send(&self, stream: StreamId, bytes: Bytes, context: u64) -> Result<(), TransportError>;

    /// Signals that a previously `Pending` receive has been fully consumed
    /// and its backing buffer may be reclaimed (spec.md §6).
    fn receive_complete(&self, stream: StreamId, consumed: usize);

    fn close_stream(&self, stream: StreamId, error_code: u64);

    fn close_connection(&self, conn: ConnectionId, error_code: u64);
}
