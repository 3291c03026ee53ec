//! The endpoint orchestrator (C7, spec.md §4.7): role-specific façades over
//! the connection/engine/store primitives. A relay composes one
//! publisher-role endpoint serving downstream viewers and one
//! subscriber-role endpoint pulling from upstream, bridging received
//! objects into the shared [`DataStore`] (spec.md §4.7 "A relay is simply
//! both façades composed").

use crate::coding::{Blob, Parameters, Tuple};
use crate::connection::{Connection, ConnectionError, ControlStream, DataStream, Role};
use crate::deser::DataStreamEvent;
use crate::engine::Engine;
use crate::ids::{Location, SubscribeId, TrackAlias, TrackIdentifier};
use crate::message::{
    error_code, BatchSubscribe, Message, Subscribe, SubscribeBody, SubscribeError, SubscribeUpdate,
    TrackStatusRequest, Unsubscribe,
};
use crate::setup::{ClientSetup, ServerSetup, Version, Versions};
use crate::store::DataStore;
use crate::transport::{
    ConnectionEvent, ConnectionId, ReceiveDisposition, StreamEvent, StreamId, Transport,
    TransportHandler,
};
use crate::watch::WaitSignal;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(thiserror::Error, Debug, Clone)]
pub enum EndpointError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("no protocol version in common with the peer")]
    UnsupportedVersion,

    #[error("a BATCH_SUBSCRIBE member's namespace isn't prefixed by the batch's namespace")]
    NamespaceMismatch,

    #[error("this endpoint is publisher-only")]
    NotSubscriber,

    #[error("this endpoint is subscriber-only")]
    NotPublisher,

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
}

/// Processor pinning / worker-count knobs (spec.md §6 `execution_config`).
#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub worker_count: usize,
    pub pin_to_processors: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            pin_to_processors: false,
        }
    }
}

/// Everything spec.md §6 enumerates under "Configuration".
#[derive(Clone, Debug)]
pub struct Config {
    pub idle_timeout_ms: u64,
    pub peer_unidi_stream_count: u32,
    pub peer_bidi_stream_count: u32,
    pub send_buffering: bool,
    pub stream_recv_window_default: u64,
    pub stream_recv_buffer_default: u64,
    pub server_resumption_level: u8,
    pub execution_config: ExecutionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10_000,
            peer_unidi_stream_count: 100,
            peer_bidi_stream_count: 10,
            send_buffering: true,
            stream_recv_window_default: 1 << 20,
            stream_recv_buffer_default: 1 << 16,
            server_resumption_level: 0,
            execution_config: ExecutionConfig::default(),
        }
    }
}

/// The result of a TRACK_STATUS_REQUEST lookup. This message set has no
/// wire-level response message for TRACK_STATUS (spec.md §4.2's table
/// deliberately omits one), so this is handed back to the caller directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrackStatus {
    pub exists: bool,
    pub latest: Option<Location>,
}

/// One object delivered to a subscriber endpoint off an inbound data stream.
#[derive(Clone, Debug)]
pub struct ReceivedObject {
    pub track_alias: TrackAlias,
    pub group_id: crate::ids::GroupId,
    pub object_id: crate::ids::ObjectId,
    pub payload: Bytes,
}

struct SubscriptionShared {
    subscribe_id: SubscribeId,
    queue: Mutex<VecDeque<ReceivedObject>>,
    notify: Notify,
    closed: AtomicBool,
}

/// A queue of objects received for one SUBSCRIBE plus a lifetime token
/// (spec.md §6 "returning a queue of received objects plus a lifetime
/// token"). Cheap to clone; every clone observes the same queue.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<SubscriptionShared>,
}

impl SubscriptionHandle {
    fn new(subscribe_id: SubscribeId) -> Self {
        Self {
            inner: Arc::new(SubscriptionShared {
                subscribe_id,
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe_id(&self) -> SubscribeId {
        self.inner.subscribe_id
    }

    pub fn try_recv(&self) -> Option<ReceivedObject> {
        self.inner.queue.lock().pop_front()
    }

    /// Waits for the next object, or `None` once the subscription has
    /// closed (peer SUBSCRIBE_ERROR, UNSUBSCRIBE, or connection loss) and
    /// its queue has drained.
    pub async fn recv(&self) -> Option<ReceivedObject> {
        loop {
            if let Some(object) = self.try_recv() {
                return Some(object);
            }
            if self.is_closed() {
                return None;
            }
            let notified = self.inner.notify.notified();
            if let Some(object) = self.try_recv() {
                return Some(object);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn push(&self, object: ReceivedObject) {
        self.inner.queue.lock().push_back(object);
        self.inner.notify.notify_waiters();
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

struct EndpointShared {
    #[allow(dead_code)]
    config: Config,
    store: DataStore,
    engine: Engine,
    role: Role,
    supported_versions: Versions,
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    setup_ready: Mutex<HashMap<ConnectionId, WaitSignal>>,
    subscriptions: Mutex<HashMap<(ConnectionId, TrackAlias), SubscriptionHandle>>,
    pending_headers: Mutex<HashMap<(ConnectionId, StreamId), crate::data::SubgroupHeader>>,
    control_stream_ids: Mutex<HashMap<ConnectionId, StreamId>>,
    control_deser: Mutex<HashMap<ConnectionId, ControlStream<Box<dyn FnMut(Message) + Send>>>>,
    data_deser: Mutex<HashMap<(ConnectionId, StreamId), DataStream<Box<dyn FnMut(DataStreamEvent) + Send>>>>,
}

/// Cheap to clone; one instance per role per process (spec.md §4.7).
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointShared>,
}

impl Endpoint {
    /// A subscriber-only endpoint: sends CLIENT_SETUP on every connection
    /// it opens and exposes `subscribe`/`batch_subscribe`.
    pub fn new_client(config: Config) -> Self {
        Self::build(config, DataStore::new(), Role::Subscriber)
    }

    /// A publisher-only endpoint, backed by `data_store`: accepts
    /// CLIENT_SETUP, admits SUBSCRIBE/BATCH_SUBSCRIBE/TRACK_STATUS_REQUEST.
    pub fn new_server(config: Config, data_store: DataStore) -> Self {
        Self::build(config, data_store, Role::Publisher)
    }

    fn build(config: Config, store: DataStore, role: Role) -> Self {
        let engine = Engine::new(store.clone());
        Self {
            inner: Arc::new(EndpointShared {
                config,
                store,
                engine,
                role,
                supported_versions: Versions(vec![Version::DRAFT_14]),
                connections: Mutex::new(HashMap::new()),
                setup_ready: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                pending_headers: Mutex::new(HashMap::new()),
                control_stream_ids: Mutex::new(HashMap::new()),
                control_deser: Mutex::new(HashMap::new()),
                data_deser: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers the incremental deserializer that turns bytes arriving on
    /// `connection`'s control stream into [`Message`]s dispatched back
    /// through `on_control_message` (spec.md §4.5/§4.7).
    fn register_control_stream(&self, connection: &Arc<Connection>) {
        let Some(stream) = connection.control_stream_id() else {
            return;
        };
        let conn_id = connection.id();
        self.inner.control_stream_ids.lock().insert(conn_id, stream);

        let endpoint = self.clone();
        let handler: Box<dyn FnMut(Message) + Send> = Box::new(move |msg| {
            if let Err(e) = endpoint.on_control_message(conn_id, msg) {
                log::warn!("control message handling failed on {conn_id}: {e}");
            }
        });
        self.inner
            .control_deser
            .lock()
            .insert(conn_id, ControlStream::new(handler));
    }

    pub fn store(&self) -> &DataStore {
        &self.inner.store
    }

    /// Shared with whatever spawns `Engine::run_worker` tasks for this
    /// endpoint's worker pool (spec.md §5 "configurable size").
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    fn connection(&self, conn: ConnectionId) -> Result<Arc<Connection>, EndpointError> {
        self.inner
            .connections
            .lock()
            .get(&conn)
            .cloned()
            .ok_or(EndpointError::UnknownConnection(conn))
    }

    /// Opens the control stream on a freshly established connection and
    /// sends CLIENT_SETUP (spec.md §4.7 "Subscriber endpoint").
    pub fn connect(&self, id: ConnectionId, transport: Arc<dyn Transport>) -> Result<Arc<Connection>, EndpointError> {
        if self.inner.role != Role::Subscriber {
            return Err(EndpointError::NotSubscriber);
        }

        let connection = Connection::new(id, transport, self.inner.role);
        connection.establish_control_stream()?;
        self.inner.setup_ready.lock().insert(id, WaitSignal::new());
        self.inner.connections.lock().insert(id, connection.clone());
        self.register_control_stream(&connection);

        let setup: Message = ClientSetup {
            versions: self.inner.supported_versions.clone(),
            params: Parameters::new(),
        }
        .into();
        connection.send_control(&setup)?;
        Ok(connection)
    }

    /// Registers an inbound connection whose control stream the transport
    /// already accepted (spec.md §4.7 "Publisher endpoint").
    pub fn accept(&self, id: ConnectionId, transport: Arc<dyn Transport>, control_stream: StreamId) -> Result<Arc<Connection>, EndpointError> {
        if self.inner.role != Role::Publisher {
            return Err(EndpointError::NotPublisher);
        }

        let connection = Connection::new(id, transport, self.inner.role);
        connection.accept_control_stream(control_stream)?;
        self.inner.connections.lock().insert(id, connection.clone());
        self.register_control_stream(&connection);
        Ok(connection)
    }

    /// Tears down every subscription and setup gate belonging to `id`; the
    /// transport embedder calls this once the underlying connection is
    /// fully gone.
    pub fn on_connection_closed(&self, id: ConnectionId) {
        if let Some(connection) = self.inner.connections.lock().remove(&id) {
            connection.mark_closed();
        }
        self.inner.setup_ready.lock().remove(&id);
        self.inner.subscriptions.lock().retain(|(conn, _), handle| {
            if *conn == id {
                handle.close();
                false
            } else {
                true
            }
        });
        self.inner.pending_headers.lock().retain(|(conn, _), _| *conn != id);
        self.inner.control_stream_ids.lock().remove(&id);
        self.inner.control_deser.lock().remove(&id);
        self.inner.data_deser.lock().retain(|(conn, _), _| *conn != id);
    }

    async fn await_setup(&self, id: ConnectionId) {
        let gate = self.inner.setup_ready.lock().get(&id).cloned();
        if let Some(gate) = gate {
            gate.acquire().await;
        }
    }

    /// Issues a SUBSCRIBE once SERVER_SETUP has arrived on `connection`,
    /// allocating a fresh track alias (spec.md §6).
    pub async fn subscribe(&self, connection: &Arc<Connection>, mut body: SubscribeBody) -> Result<SubscriptionHandle, EndpointError> {
        if self.inner.role != Role::Subscriber {
            return Err(EndpointError::NotSubscriber);
        }
        let id = connection.id();
        self.await_setup(id).await;

        body.track_alias = connection.new_track_alias();
        let track = TrackIdentifier::new(body.track_namespace.clone(), body.track_name.clone());
        connection.bind_track_alias(body.track_alias, track);

        let handle = SubscriptionHandle::new(body.subscribe_id);
        self.inner.subscriptions.lock().insert((id, body.track_alias), handle.clone());

        connection.send_control(&Subscribe(body).into())?;
        Ok(handle)
    }

    /// Expands into one SUBSCRIBE per element of `bodies`, all sharing
    /// `prefix`, sent as a single BATCH_SUBSCRIBE (spec.md §4.7).
    pub async fn batch_subscribe(
        &self,
        connection: &Arc<Connection>,
        prefix: Tuple,
        mut bodies: Vec<SubscribeBody>,
    ) -> Result<Vec<SubscriptionHandle>, EndpointError> {
        if self.inner.role != Role::Subscriber {
            return Err(EndpointError::NotSubscriber);
        }
        for body in &bodies {
            if !prefix.is_prefix_of(&body.track_namespace) {
                return Err(EndpointError::NamespaceMismatch);
            }
        }

        let id = connection.id();
        self.await_setup(id).await;

        let mut handles = Vec::with_capacity(bodies.len());
        for body in &mut bodies {
            body.track_alias = connection.new_track_alias();
            let track = TrackIdentifier::new(body.track_namespace.clone(), body.track_name.clone());
            connection.bind_track_alias(body.track_alias, track);

            let handle = SubscriptionHandle::new(body.subscribe_id);
            self.inner.subscriptions.lock().insert((id, body.track_alias), handle.clone());
            handles.push(handle);
        }

        connection.send_control(
            &BatchSubscribe {
                namespace_prefix: prefix,
                subscribes: bodies,
            }
            .into(),
        )?;
        Ok(handles)
    }

    /// A direct store lookup, used to answer TRACK_STATUS_REQUEST (spec.md
    /// §4.7 "a lookup into the store" - this message set defines no wire
    /// response for it, see spec.md §4.2's message table).
    pub fn track_status(&self, namespace: &Tuple, name: &str) -> TrackStatus {
        let Some(track) = self.inner.store.get_track(&TrackIdentifier {
            namespace: namespace.clone(),
            name: name.to_string(),
        }) else {
            return TrackStatus::default();
        };

        let latest = track.latest_group().and_then(|group| {
            group.latest_registered_object().map(|object_id| Location {
                group_id: group.id(),
                object_id,
            })
        });
        TrackStatus { exists: true, latest }
    }

    /// Dispatches one decoded control message for `conn` (spec.md §4.7).
    pub fn on_control_message(&self, conn: ConnectionId, msg: Message) -> Result<(), EndpointError> {
        let connection = self.connection(conn)?;

        match msg {
            Message::ClientSetup(cs) => self.handle_client_setup(&connection, cs),
            Message::ServerSetup(ss) => self.handle_server_setup(conn, ss),
            Message::Subscribe(Subscribe(body)) => {
                self.handle_subscribe(&connection, body);
                Ok(())
            }
            Message::BatchSubscribe(batch) => self.handle_batch_subscribe_inbound(&connection, batch),
            Message::SubscribeError(err) => {
                self.handle_subscribe_error(conn, err);
                Ok(())
            }
            Message::SubscribeUpdate(update) => {
                self.handle_subscribe_update(update);
                Ok(())
            }
            Message::Unsubscribe(Unsubscribe { subscribe_id }) => {
                self.inner.engine.cancel(subscribe_id);
                Ok(())
            }
            Message::TrackStatusRequest(TrackStatusRequest { track_namespace, track_name }) => {
                let status = self.track_status(&track_namespace, &track_name);
                log::debug!("TRACK_STATUS_REQUEST {track_namespace:?}/{track_name}: {status:?}");
                Ok(())
            }
        }
    }

    fn handle_client_setup(&self, connection: &Arc<Connection>, cs: ClientSetup) -> Result<(), EndpointError> {
        let selected = self
            .inner
            .supported_versions
            .iter()
            .find(|v| cs.versions.contains(v))
            .copied();

        let Some(selected) = selected else {
            connection.mark_closed();
            return Err(EndpointError::UnsupportedVersion);
        };

        let reply: Message = ServerSetup {
            selected_version: selected,
            params: Parameters::new(),
        }
        .into();
        connection.send_control(&reply)?;
        Ok(())
    }

    fn handle_server_setup(&self, conn: ConnectionId, ss: ServerSetup) -> Result<(), EndpointError> {
        if !self.inner.supported_versions.contains(&ss.selected_version) {
            return Err(EndpointError::UnsupportedVersion);
        }
        if let Some(gate) = self.inner.setup_ready.lock().get(&conn) {
            gate.release();
        }
        Ok(())
    }

    fn handle_subscribe(&self, connection: &Arc<Connection>, body: SubscribeBody) {
        let track = TrackIdentifier::new(body.track_namespace.clone(), body.track_name.clone());

        if self.inner.store.get_track(&track).is_none() {
            let err: Message = SubscribeError {
                subscribe_id: body.subscribe_id,
                error_code: error_code::TRACK_DOES_NOT_EXIST,
                reason_phrase: Blob::from(b"track does not exist".to_vec()),
                track_alias: body.track_alias,
            }
            .into();
            if let Err(e) = connection.send_control(&err) {
                log::warn!("failed to send SUBSCRIBE_ERROR for {:?}: {e}", body.subscribe_id);
            }
            return;
        }

        connection.bind_track_alias(body.track_alias, track.clone());
        self.inner.engine.submit(connection.downgrade(), track, body);
    }

    fn handle_batch_subscribe_inbound(&self, connection: &Arc<Connection>, batch: BatchSubscribe) -> Result<(), EndpointError> {
        for body in batch.subscribes {
            if !batch.namespace_prefix.is_prefix_of(&body.track_namespace) {
                let err: Message = SubscribeError {
                    subscribe_id: body.subscribe_id,
                    error_code: error_code::INTERNAL_ERROR,
                    reason_phrase: Blob::from(b"namespace does not share the batch prefix".to_vec()),
                    track_alias: body.track_alias,
                }
                .into();
                connection.send_control(&err)?;
                continue;
            }
            self.handle_subscribe(connection, body);
        }
        Ok(())
    }

    fn handle_subscribe_error(&self, conn: ConnectionId, err: SubscribeError) {
        if let Some(handle) = self.inner.subscriptions.lock().remove(&(conn, err.track_alias)) {
            log::warn!(
                "subscription {:?} rejected (code {}): {:?}",
                err.subscribe_id,
                err.error_code,
                err.reason_phrase
            );
            handle.close();
        }
    }

    fn handle_subscribe_update(&self, update: SubscribeUpdate) {
        log::debug!("ignoring SUBSCRIBE_UPDATE for {:?}: {:?}", update.subscribe_id, update);
    }

    /// Feeds one parsed data-stream record into the routing table,
    /// delivering objects to the matching `SubscriptionHandle` (spec.md
    /// §4.7 "Routes inbound data-stream objects into a user-visible
    /// queue"). `stream` disambiguates concurrently open data streams on
    /// the same connection, since a `SubgroupHeader` only arrives once per
    /// stream but every following `Object` needs it.
    pub fn on_data_stream_event(&self, conn: ConnectionId, stream: StreamId, event: DataStreamEvent) {
        match event {
            DataStreamEvent::SubgroupHeader(header) => {
                self.inner.pending_headers.lock().insert((conn, stream), header);
            }
            DataStreamEvent::Object(object) => {
                let header = self.inner.pending_headers.lock().get(&(conn, stream)).cloned();
                let Some(header) = header else {
                    log::warn!("object on {stream} before its SUBGROUP header arrived");
                    return;
                };

                let handle = self.inner.subscriptions.lock().get(&(conn, header.track_alias)).cloned();
                if let Some(handle) = handle {
                    handle.push(ReceivedObject {
                        track_alias: header.track_alias,
                        group_id: header.group_id,
                        object_id: object.object_id,
                        payload: object.payload.0,
                    });
                }
            }
        }
    }

    /// Feeds raw bytes received on `stream` into whichever incremental
    /// deserializer owns it - the connection's single control stream, or a
    /// per-data-stream one created lazily on first receive.
    fn feed_stream_bytes(&self, conn: ConnectionId, stream: StreamId, bytes: &[u8]) {
        let is_control = self.inner.control_stream_ids.lock().get(&conn) == Some(&stream);

        if is_control {
            let mut control = self.inner.control_deser.lock();
            let Some(cs) = control.get_mut(&conn) else {
                return;
            };
            if let Err(e) = cs.receive(bytes) {
                log::warn!("control stream decode failed on {conn}: {e}");
                drop(control);
                if let Ok(connection) = self.connection(conn) {
                    connection.mark_closed();
                }
            }
            return;
        }

        let mut data = self.inner.data_deser.lock();
        let entry = data.entry((conn, stream)).or_insert_with(|| {
            let endpoint = self.clone();
            let handler: Box<dyn FnMut(DataStreamEvent) + Send> =
                Box::new(move |event| endpoint.on_data_stream_event(conn, stream, event));
            DataStream::new(handler)
        });
        if let Err(e) = entry.receive(bytes) {
            log::warn!("data stream {stream} decode failed on {conn}: {e}");
            data.remove(&(conn, stream));
        }
    }
}

impl TransportHandler for Endpoint {
    /// Drives connection teardown from the transport (spec.md §6); stream
    /// start/resume events carry no action this endpoint needs to take
    /// eagerly, since data streams register themselves on first receive and
    /// a publisher's inbound control stream is handed to `accept` directly.
    fn on_connection_event(&self, conn: ConnectionId, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ShutdownInitiatedByTransport
            | ConnectionEvent::ShutdownInitiatedByPeer
            | ConnectionEvent::ShutdownComplete => self.on_connection_closed(conn),
            ConnectionEvent::Connected
            | ConnectionEvent::Resumed
            | ConnectionEvent::PeerStreamStarted { .. } => {}
        }
    }

    fn on_stream_event(
        &self,
        conn: ConnectionId,
        stream: StreamId,
        event: StreamEvent,
    ) -> ReceiveDisposition {
        match event {
            StreamEvent::Receive(bytes) => {
                self.feed_stream_bytes(conn, stream, &bytes);
                ReceiveDisposition::Consumed
            }
            StreamEvent::PeerSendShutdown | StreamEvent::ShutdownComplete => {
                self.inner.data_deser.lock().remove(&(conn, stream));
                self.inner.pending_headers.lock().remove(&(conn, stream));
                ReceiveDisposition::Consumed
            }
            StreamEvent::StartComplete | StreamEvent::SendComplete { .. } => {
                ReceiveDisposition::Consumed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{GroupId, ObjectId, PublisherPriority, SubGroupId, SubscriberPriority};
    use crate::message::FilterType;
    use crate::transport::{StreamDirection, TransportError};
    use crate::GroupOrder;
    use std::sync::atomic::AtomicU64;

    struct RecordingTransport {
        sent: Mutex<Vec<(StreamId, Bytes)>>,
        next_stream: AtomicU64,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                next_stream: AtomicU64::new(0),
            }
        }
    }

    impl Transport for RecordingTransport {
        fn open_stream(&self, _conn: ConnectionId, _direction: StreamDirection, _priority: u8) -> Result<StreamId, TransportError> {
            Ok(StreamId(self.next_stream.fetch_add(1, Ordering::Relaxed)))
        }

        fn send(&self, stream: StreamId, bytes: Bytes, _context: u64) -> Result<(), TransportError> {
            self.sent.lock().push((stream, bytes));
            Ok(())
        }

        fn receive_complete(&self, _stream: StreamId, _consumed: usize) {}
        fn close_stream(&self, _stream: StreamId, _error_code: u64) {}
        fn close_connection(&self, _conn: ConnectionId, _error_code: u64) {}
    }

    fn sample_body(namespace: &str, name: &str) -> SubscribeBody {
        SubscribeBody {
            subscribe_id: SubscribeId(1),
            track_alias: TrackAlias(0),
            track_namespace: Tuple::from(vec![namespace]),
            track_name: name.to_string(),
            subscriber_priority: SubscriberPriority(0),
            group_order: GroupOrder::Ascending,
            filter_type: FilterType::LatestGroup,
            start: None,
            end: None,
            params: Parameters::new(),
        }
    }

    #[test]
    fn server_rejects_subscribe_for_missing_track() {
        let store = DataStore::new();
        let endpoint = Endpoint::new_server(Config::default(), store);
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport.clone(), Role::Publisher);
        connection.establish_control_stream().unwrap();
        endpoint.inner.connections.lock().insert(ConnectionId(0), connection.clone());

        endpoint
            .on_control_message(ConnectionId(0), Subscribe(sample_body("ns", "missing")).into())
            .unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1); // SUBSCRIBE_ERROR only; open_stream doesn't itself send
        assert!(!sent[0].1.is_empty());
    }

    #[test]
    fn server_admits_subscribe_for_existing_track() {
        let store = DataStore::new();
        let track_id = TrackIdentifier::new(Tuple::from(vec!["ns"]), "track");
        store.get_or_create_track(track_id, PublisherPriority(0), None);

        let endpoint = Endpoint::new_server(Config::default(), store);
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport, Role::Publisher);
        connection.establish_control_stream().unwrap();
        endpoint.inner.connections.lock().insert(ConnectionId(0), connection.clone());

        endpoint
            .on_control_message(ConnectionId(0), Subscribe(sample_body("ns", "track")).into())
            .unwrap();

        assert_eq!(connection.track_for_alias(TrackAlias(7)), None);
        assert!(connection.alias_for_track(&TrackIdentifier { namespace: Tuple::from(vec!["ns"]), name: "track".to_string() }).is_some());
    }

    #[test]
    fn batch_subscribe_rejects_mismatched_namespace() {
        let endpoint = Endpoint::new_client(Config::default());
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport, Role::Subscriber);
        endpoint.inner.connections.lock().insert(ConnectionId(0), connection.clone());

        let bodies = vec![sample_body("other", "track")];
        let result = futures::executor::block_on(endpoint.batch_subscribe(&connection, Tuple::from(vec!["ns"]), bodies));
        assert!(matches!(result, Err(EndpointError::NamespaceMismatch)));
    }

    #[tokio::test]
    async fn client_setup_and_subscribe_unblocks_after_server_setup() {
        let endpoint = Endpoint::new_client(Config::default());
        let transport = Arc::new(RecordingTransport::new());
        let connection = endpoint.connect(ConnectionId(0), transport.clone()).unwrap();

        let sub = tokio::spawn({
            let endpoint = endpoint.clone();
            let connection = connection.clone();
            async move { endpoint.subscribe(&connection, sample_body("ns", "track")).await }
        });

        tokio::task::yield_now().await;
        assert_eq!(transport.sent.lock().len(), 1); // only CLIENT_SETUP so far

        endpoint
            .on_control_message(
                ConnectionId(0),
                ServerSetup {
                    selected_version: Version::DRAFT_14,
                    params: Parameters::new(),
                }
                .into(),
            )
            .unwrap();

        let handle = sub.await.unwrap().unwrap();
        assert_eq!(handle.subscribe_id(), SubscribeId(1));
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[test]
    fn data_stream_objects_route_to_subscription_queue() {
        let endpoint = Endpoint::new_client(Config::default());
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport, Role::Subscriber);
        endpoint.inner.connections.lock().insert(ConnectionId(0), connection.clone());

        let handle = SubscriptionHandle::new(SubscribeId(1));
        endpoint.inner.subscriptions.lock().insert((ConnectionId(0), TrackAlias(7)), handle.clone());

        let header = crate::data::SubgroupHeader {
            track_alias: TrackAlias(7),
            group_id: GroupId(0),
            subgroup_id: SubGroupId(0),
            publisher_priority: PublisherPriority(0),
        };
        endpoint.on_data_stream_event(ConnectionId(0), StreamId(0), DataStreamEvent::SubgroupHeader(header));
        endpoint.on_data_stream_event(
            ConnectionId(0),
            StreamId(0),
            DataStreamEvent::Object(crate::data::SubgroupObject {
                object_id: ObjectId(0),
                payload: Blob(Bytes::from_static(b"hi")),
            }),
        );

        let received = handle.try_recv().unwrap();
        assert_eq!(received.object_id, ObjectId(0));
        assert_eq!(received.payload, Bytes::from_static(b"hi"));
    }

    #[test]
    fn raw_control_stream_bytes_dispatch_through_transport_handler() {
        let store = DataStore::new();
        let endpoint = Endpoint::new_server(Config::default(), store);
        let transport = Arc::new(RecordingTransport::new());
        let connection = endpoint
            .accept(ConnectionId(0), transport.clone(), StreamId(0))
            .unwrap();
        assert_eq!(connection.control_stream_id(), Some(StreamId(0)));

        let msg: Message = Subscribe(sample_body("ns", "missing")).into();
        let wire = crate::deser::encode_control_message(&msg).unwrap().freeze();

        let disposition = endpoint.on_stream_event(ConnectionId(0), StreamId(0), crate::transport::StreamEvent::Receive(wire));
        assert_eq!(disposition, crate::transport::ReceiveDisposition::Consumed);

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1); // SUBSCRIBE_ERROR, routed off the raw bytes path
    }

    #[test]
    fn raw_data_stream_bytes_route_to_subscription_queue() {
        let endpoint = Endpoint::new_client(Config::default());
        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport, Role::Subscriber);
        endpoint.inner.connections.lock().insert(ConnectionId(0), connection.clone());

        let handle = SubscriptionHandle::new(SubscribeId(1));
        endpoint.inner.subscriptions.lock().insert((ConnectionId(0), TrackAlias(7)), handle.clone());

        let header = crate::data::SubgroupHeader {
            track_alias: TrackAlias(7),
            group_id: GroupId(0),
            subgroup_id: SubGroupId(0),
            publisher_priority: PublisherPriority(0),
        };
        let object = crate::data::SubgroupObject {
            object_id: ObjectId(0),
            payload: Blob(Bytes::from_static(b"hi")),
        };

        use crate::coding::Encode;
        let mut wire = bytes::BytesMut::new();
        crate::data::StreamHeaderKind::Subgroup.encode(&mut wire).unwrap();
        header.encode(&mut wire).unwrap();
        object.encode(&mut wire).unwrap();

        endpoint.on_stream_event(
            ConnectionId(0),
            StreamId(0),
            crate::transport::StreamEvent::Receive(wire.freeze()),
        );

        let received = handle.try_recv().unwrap();
        assert_eq!(received.object_id, ObjectId(0));
        assert_eq!(received.payload, Bytes::from_static(b"hi"));
    }
}
