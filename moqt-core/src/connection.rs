//! Per-connection bookkeeping (C5, spec.md §4.5): the control stream, the
//! set of unidirectional data streams, and the track-alias <-> track
//! identifier mapping that object routing depends on.

use crate::coding::Blob;
use crate::data::{SubgroupHeader, SubgroupObject};
use crate::deser::{ControlDeserializer, DataDeserializer};
use crate::ids::{GroupId, ObjectId, PublisherPriority, SubGroupId, TrackAlias, TrackIdentifier};
use crate::message::Message;
use crate::transport::{ConnectionId, StreamDirection, StreamId, Transport, TransportError};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(thiserror::Error, Debug, Clone)]
pub enum ConnectionError {
    #[error("control stream already established")]
    ControlStreamAlreadyEstablished,

    #[error("decode error: {0}")]
    Decode(#[from] crate::coding::DecodeError),

    #[error("encode error: {0}")]
    Encode(#[from] crate::coding::EncodeError),

    #[error("connection has expired")]
    ConnectionExpired,

    #[error("control stream has not been established yet")]
    NoControlStream,

    #[error("no data stream accepts object {0}")]
    NoRoute(ObjectId),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ConnectionError {
    /// Application error code closing the affected stream/connection with
    /// (spec.md §7 recovery policy).
    pub fn code(&self) -> u64 {
        match self {
            Self::Decode(_) => 0x3,  // PROTOCOL_VIOLATION
            Self::Encode(_) => 0x1,  // INTERNAL_ERROR
            Self::ControlStreamAlreadyEstablished => 0x3,
            Self::NoControlStream => 0x3,
            Self::ConnectionExpired => 0x0,
            Self::NoRoute(_) => 0x1,
            Self::Transport(_) => 0x1,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Publisher,
    Subscriber,
    Both,
}

/// The SUBGROUP header a data stream committed to once the producer sent
/// its first bytes; later objects on the same stream must match it exactly
/// (spec.md §3 invariant 4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DataStreamHeader {
    pub track_alias: TrackAlias,
    pub group_id: GroupId,
    pub subgroup_id: SubGroupId,
}

struct DataStreamSlot {
    header: DataStreamHeader,
    next_expected: ObjectId,
    sending: bool,
    stream: StreamId,
}

impl DataStreamSlot {
    fn can_send_object(&self, track_alias: TrackAlias, group_id: GroupId, object_id: ObjectId) -> bool {
        self.header.track_alias == track_alias
            && self.header.group_id == group_id
            && object_id == self.next_expected
    }
}

struct ConnectionState {
    control_established: bool,
    control_stream: Option<StreamId>,
    data_streams: Vec<DataStreamSlot>,
    alias_to_track: HashMap<TrackAlias, Arc<TrackIdentifier>>,
    track_to_alias: HashMap<Arc<TrackIdentifier>, TrackAlias>,
    current_group: HashMap<Arc<TrackIdentifier>, GroupId>,
    role: Role,
}

/// One QUIC connection's worth of state, shared between the transport
/// callbacks and the endpoint orchestrator.
pub struct Connection {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    state: RwLock<ConnectionState>,
    next_alias: AtomicU64,
    alive: std::sync::atomic::AtomicBool,
}

/// A weak handle used by the subscription engine to detect connection loss
/// (spec.md §4.6 "Cancellation and shutdown"): `upgrade` fails once every
/// strong `Arc<Connection>` has been dropped.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<Connection>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Arc<Connection>> {
        self.inner.upgrade()
    }
}

impl Connection {
    pub fn new(id: ConnectionId, transport: Arc<dyn Transport>, role: Role) -> Arc<Self> {
        Arc::new(Self {
            id,
            transport,
            state: RwLock::new(ConnectionState {
                control_established: false,
                control_stream: None,
                data_streams: Vec::new(),
                alias_to_track: HashMap::new(),
                track_to_alias: HashMap::new(),
                current_group: HashMap::new(),
                role,
            }),
            next_alias: AtomicU64::new(0),
            alive: std::sync::atomic::AtomicBool::new(true),
        })
    }

    pub fn downgrade(self: &Arc<Self>) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(self),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.state.read().role
    }

    /// Opens the outbound control stream with the priority flag set
    /// (highest priority; control traffic must not queue behind objects).
    /// Idempotency beyond the first call is a fatal error (spec.md §4.5).
    pub fn establish_control_stream(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.write();
        if state.control_established {
            return Err(ConnectionError::ControlStreamAlreadyEstablished);
        }
        let stream = self
            .transport
            .open_stream(self.id, StreamDirection::Bidirectional, 0)?;
        state.control_established = true;
        state.control_stream = Some(stream);
        Ok(())
    }

    pub fn accept_control_stream(&self, stream: StreamId) -> Result<(), ConnectionError> {
        let mut state = self.state.write();
        state.control_established = true;
        state.control_stream = Some(stream);
        Ok(())
    }

    pub fn control_stream_id(&self) -> Option<StreamId> {
        self.state.read().control_stream
    }

    /// Enqueues `msg` onto the control stream (spec.md §4.5 `send_control`).
    pub fn send_control(&self, msg: &Message) -> Result<(), ConnectionError> {
        let stream = self
            .state
            .read()
            .control_stream
            .ok_or(ConnectionError::NoControlStream)?;
        let bytes = crate::deser::encode_control_message(msg)?.freeze();
        self.transport.send(stream, bytes, 0)?;
        Ok(())
    }

    pub fn accept_data_stream(&self) -> Result<(), ConnectionError> {
        // Bookkeeping only; the header is learned once the deserializer
        // parses the stream's SubgroupHeader.
        Ok(())
    }

    pub fn bind_track_alias(&self, alias: TrackAlias, track: Arc<TrackIdentifier>) {
        let mut state = self.state.write();
        state.alias_to_track.insert(alias, track.clone());
        state.track_to_alias.insert(track, alias);
    }

    pub fn track_for_alias(&self, alias: TrackAlias) -> Option<Arc<TrackIdentifier>> {
        self.state.read().alias_to_track.get(&alias).cloned()
    }

    pub fn alias_for_track(&self, track: &TrackIdentifier) -> Option<TrackAlias> {
        self.state.read().track_to_alias.get(track).copied()
    }

    /// Allocates a fresh, connection-scoped track alias.
    pub fn new_track_alias(&self) -> TrackAlias {
        TrackAlias(self.next_alias.fetch_add(1, Ordering::Relaxed))
    }

    pub fn set_current_group(&self, track: Arc<TrackIdentifier>, group_id: GroupId) {
        self.state.write().current_group.insert(track, group_id);
    }

    pub fn current_group(&self, track: &TrackIdentifier) -> Option<GroupId> {
        self.state.read().current_group.get(track).copied()
    }

    /// Registers a data stream's committed header once its first bytes
    /// have been sent.
    fn register_sending_stream(&self, header: DataStreamHeader, next_expected: ObjectId, stream: StreamId) {
        self.state.write().data_streams.push(DataStreamSlot {
            header,
            next_expected,
            sending: true,
            stream,
        });
    }

    /// True if some open data stream's header/cursor matches `(track,
    /// group, object)` exactly (spec.md §4.5).
    pub fn can_send_object(&self, track_alias: TrackAlias, group_id: GroupId, object_id: ObjectId) -> bool {
        self.state
            .read()
            .data_streams
            .iter()
            .any(|s| s.sending && s.can_send_object(track_alias, group_id, object_id))
    }

    /// Advances the matching stream's expected-next cursor after a send.
    pub fn advance_stream(&self, track_alias: TrackAlias, group_id: GroupId, sent: ObjectId) {
        let mut state = self.state.write();
        if let Some(slot) = state
            .data_streams
            .iter_mut()
            .find(|s| s.can_send_object(track_alias, group_id, sent))
        {
            slot.next_expected = ObjectId(sent.get() + 1);
        }
    }

    /// For scalable-layer supersede: cancels a stream that has the named
    /// object queued but not yet sent. No-op if no such stream exists.
    pub fn abort_if_sending(&self, track_alias: TrackAlias, group_id: GroupId, object_id: ObjectId) {
        let mut state = self.state.write();
        let mut to_close = None;
        state.data_streams.retain(|s| {
            let matches = s.can_send_object(track_alias, group_id, object_id);
            if matches {
                to_close = Some(s.stream);
            }
            !matches
        });
        drop(state);
        if let Some(stream) = to_close {
            self.transport.close_stream(stream, 0);
        }
    }

    /// Routes `payload` onto the first data stream whose `can_send_object`
    /// matches `(track_alias, group_id, object_id)`; if none exists, opens
    /// a fresh unidirectional stream, sends its SUBGROUP header, and sends
    /// the object on it (spec.md §4.5).
    pub fn send_object(
        &self,
        track_alias: TrackAlias,
        group_id: GroupId,
        subgroup_id: SubGroupId,
        publisher_priority: PublisherPriority,
        object_id: ObjectId,
        payload: Bytes,
    ) -> Result<(), ConnectionError> {
        if !self.is_alive() {
            return Err(ConnectionError::ConnectionExpired);
        }

        let existing_stream = {
            let state = self.state.read();
            state
                .data_streams
                .iter()
                .find(|s| s.sending && s.can_send_object(track_alias, group_id, object_id))
                .map(|s| s.stream)
        };

        let stream = match existing_stream {
            Some(stream) => stream,
            None => {
                let stream = self.transport.open_stream(
                    self.id,
                    StreamDirection::Unidirectional,
                    publisher_priority.get(),
                )?;
                let header = SubgroupHeader {
                    track_alias,
                    group_id,
                    subgroup_id,
                    publisher_priority,
                };
                let open_bytes = encode_subgroup_open(&header)?;
                self.transport.send(stream, open_bytes, 0)?;
                self.register_sending_stream(
                    DataStreamHeader {
                        track_alias,
                        group_id,
                        subgroup_id,
                    },
                    object_id,
                    stream,
                );
                stream
            }
        };

        let bytes = encode_subgroup_object(&SubgroupObject {
            object_id,
            payload: Blob(payload),
        })?;
        self.transport.send(stream, bytes, 0)?;
        self.advance_stream(track_alias, group_id, object_id);
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Builds per-stream incremental deserializers bound to a connection's
/// handler callbacks; kept separate from `Connection` itself since the
/// deserializer isn't `Sync` (it mutates an internal buffer) while the
/// connection state is shared across threads.
pub struct ControlStream<F: FnMut(Message)> {
    pub deser: ControlDeserializer<F>,
}

impl<F: FnMut(Message)> ControlStream<F> {
    pub fn new(handler: F) -> Self {
        Self {
            deser: ControlDeserializer::new(handler),
        }
    }

    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.deser.append(bytes).map_err(ConnectionError::from)
    }
}

pub struct DataStream<F: FnMut(crate::deser::DataStreamEvent)> {
    pub deser: DataDeserializer<F>,
}

impl<F: FnMut(crate::deser::DataStreamEvent)> DataStream<F> {
    pub fn new(handler: F) -> Self {
        Self {
            deser: DataDeserializer::new(handler),
        }
    }

    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.deser.append(bytes).map_err(ConnectionError::from)
    }
}

/// Serializes a SUBGROUP stream's opening bytes (kind + header), ready to
/// hand to the transport's send primitive.
pub fn encode_subgroup_open(header: &crate::data::SubgroupHeader) -> Result<Bytes, crate::coding::EncodeError> {
    use crate::coding::Encode;
    let mut buf = bytes::BytesMut::new();
    crate::data::StreamHeaderKind::Subgroup.encode(&mut buf)?;
    header.encode(&mut buf)?;
    Ok(buf.freeze())
}

pub fn encode_subgroup_object(object: &crate::data::SubgroupObject) -> Result<Bytes, crate::coding::EncodeError> {
    use crate::coding::Encode;
    let mut buf = bytes::BytesMut::new();
    object.encode(&mut buf)?;
    Ok(buf.freeze())
}
