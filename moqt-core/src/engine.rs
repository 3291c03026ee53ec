//! The subscription engine (C6, spec.md §4.6): expands a SUBSCRIBE into one
//! or more per-group [`MinorSubscriptionState`]s and drains them onto a
//! connection's data streams from a fixed-size worker pool.

use crate::coding::Blob;
use crate::connection::{Connection, WeakConnection};
use crate::ids::{GroupId, ObjectId, SubGroupId, SubscribeId, TrackAlias, TrackIdentifier};
use crate::message::{error_code, FilterType, Message, SubscribeBody, SubscribeError};
use crate::store::{DataStore, GroupHandle, Lookup, TrackHandle};
use crate::watch::WaitSignal;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineError {
    #[error("subscribed track does not exist")]
    TrackDoesNotExist,

    #[error("subscribed group does not exist")]
    GroupDoesNotExist,

    #[error("subscribed object does not exist")]
    ObjectDoesNotExist,

    #[error("connection error: {0}")]
    Connection(#[from] crate::connection::ConnectionError),
}

impl EngineError {
    pub fn code(&self) -> u64 {
        match self {
            Self::TrackDoesNotExist => error_code::TRACK_DOES_NOT_EXIST,
            Self::GroupDoesNotExist => error_code::GROUP_DOES_NOT_EXIST,
            Self::ObjectDoesNotExist => error_code::OBJECT_DOES_NOT_EXIST,
            Self::Connection(_) => error_code::INTERNAL_ERROR,
        }
    }
}

/// A (connection, SUBSCRIBE body) pair waiting for a worker to pick it up.
#[derive(Clone)]
struct PendingSubscription {
    connection: WeakConnection,
    track: Arc<TrackIdentifier>,
    body: SubscribeBody,
}

/// One group's worth of streaming state within a subscription (spec.md
/// §4.6 "one per group to be streamed"). All forwarding for a minor is
/// sent as a single outbound SUBGROUP; the store doesn't retain the
/// producer's original subgroup boundaries (§4.4 only tracks object-id
/// ranges), so the engine always re-subgroups its output as subgroup 0 of
/// the group - `Connection::can_send_object` never inspects subgroup-id,
/// so this is observationally transparent to the wire protocol.
struct MinorSubscriptionState {
    group: GroupHandle,
    group_id: GroupId,
    next_object: ObjectId,
    /// Inclusive upper bound; `None` means "keep following new arrivals".
    terminal: Option<ObjectId>,
    must_send: bool,
    last_sent: Option<ObjectId>,
    waiting: Option<WaitSignal>,
    done: bool,
}

const ENGINE_SUBGROUP: SubGroupId = SubGroupId(0);

impl MinorSubscriptionState {
    fn new(group: GroupHandle, group_id: GroupId, start: ObjectId, terminal: Option<ObjectId>, must_send: bool) -> Self {
        Self {
            group,
            group_id,
            next_object: start,
            terminal,
            must_send,
            last_sent: None,
            waiting: None,
            done: false,
        }
    }

    fn is_blocked(&self) -> bool {
        matches!(&self.waiting, Some(signal) if !signal.is_ready())
    }

    /// Fetches and forwards the next object, or parks on a wait-signal.
    /// Retires the minor once it passes its terminal id.
    fn fulfill_some_minor(
        &mut self,
        track_alias: TrackAlias,
        connection: &Connection,
        subscribe_timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        if self.done || self.is_blocked() {
            return Ok(());
        }
        self.waiting = None;

        if let Some(terminal) = self.terminal {
            if self.next_object.get() > terminal.get() {
                self.done = true;
                return Ok(());
            }
        }

        match self.group.get_object(self.next_object) {
            Lookup::DoesNotExist => {
                self.done = true;
                Err(EngineError::ObjectDoesNotExist)
            }
            Lookup::Wait(signal) => {
                self.waiting = Some(signal);
                Ok(())
            }
            Lookup::Ready(object) => {
                if !self.must_send {
                    if let Some(previous) = self.last_sent {
                        connection.abort_if_sending(track_alias, self.group_id, previous);
                    }
                }

                // Effective timeout = min(subscribe-level, object-level),
                // undefined treated as +inf (spec.md §4.6). The relay's
                // timer wheel instance is what actually schedules the
                // expiry; this just computes the value it's scheduled with.
                let _effective_timeout = match (subscribe_timeout, object.delivery_timeout) {
                    (None, None) => None,
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (Some(a), Some(b)) => Some(a.min(b)),
                };

                connection.send_object(
                    track_alias,
                    self.group_id,
                    ENGINE_SUBGROUP,
                    object.publisher_priority,
                    self.next_object,
                    object.payload.clone(),
                )?;

                self.last_sent = Some(self.next_object);
                self.next_object = ObjectId(self.next_object.get() + 1);
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SubscriptionStatus {
    Active,
    Errored,
    Cancelled,
    Done,
}

struct SubscriptionState {
    subscribe_id: SubscribeId,
    track_alias: TrackAlias,
    connection: WeakConnection,
    minors: Vec<MinorSubscriptionState>,
    status: SubscriptionStatus,
    subscribe_timeout: Option<Duration>,
    error: Option<EngineError>,
}

impl SubscriptionState {
    /// Filter expansion (spec.md §4.6 table). On failure the caller sends
    /// SUBSCRIBE_ERROR itself; the subscription never occupies a worker
    /// slot ("marked for cleanup rather than retried").
    fn new(store: &DataStore, pending: PendingSubscription) -> Result<Self, (PendingSubscription, EngineError)> {
        let Some(track) = store.get_track(&pending.track) else {
            return Err((pending, EngineError::TrackDoesNotExist));
        };

        let minors = match expand_filter(&track, &pending.body) {
            Ok(m) => m,
            Err(e) => return Err((pending, e)),
        };

        let subscribe_timeout = pending
            .body
            .params
            .delivery_timeout()
            .ok()
            .flatten()
            .map(Duration::from_millis);

        Ok(Self {
            subscribe_id: pending.body.subscribe_id,
            track_alias: pending.body.track_alias,
            connection: pending.connection,
            minors,
            status: SubscriptionStatus::Active,
            subscribe_timeout,
            error: None,
        })
    }

    /// One fulfilment pass over every not-currently-blocked minor
    /// (spec.md §4.6 "fulfilment loop").
    fn fulfill_some(&mut self) {
        if self.status != SubscriptionStatus::Active {
            return;
        }

        let Some(connection) = self.connection.upgrade() else {
            self.status = SubscriptionStatus::Cancelled;
            return;
        };
        if !connection.is_alive() {
            self.status = SubscriptionStatus::Cancelled;
            return;
        }

        for minor in &mut self.minors {
            if let Err(e) = minor.fulfill_some_minor(self.track_alias, &connection, self.subscribe_timeout) {
                self.status = SubscriptionStatus::Errored;
                self.error = Some(e);
                return;
            }
        }

        if !self.minors.is_empty() && self.minors.iter().all(|m| m.done) {
            self.status = SubscriptionStatus::Done;
        }
    }

    fn notify_error(&self) {
        let Some(connection) = self.connection.upgrade() else {
            return;
        };
        let err = self.error.clone().unwrap_or(EngineError::ObjectDoesNotExist);
        let msg: Message = SubscribeError {
            subscribe_id: self.subscribe_id,
            error_code: err.code(),
            reason_phrase: Blob::from(err.to_string().into_bytes()),
            track_alias: self.track_alias,
        }
        .into();
        if let Err(e) = connection.send_control(&msg) {
            log::warn!("failed to deliver SUBSCRIBE_ERROR for {:?}: {e}", self.subscribe_id);
        }
    }
}

fn expand_filter(track: &TrackHandle, body: &SubscribeBody) -> Result<Vec<MinorSubscriptionState>, EngineError> {
    match body.filter_type {
        FilterType::LatestGroup => {
            let group = track.latest_group().ok_or(EngineError::GroupDoesNotExist)?;
            let start = group.first_object_id().unwrap_or(ObjectId(0));
            Ok(vec![MinorSubscriptionState::new(group.clone(), group.id(), start, None, true)])
        }

        FilterType::LatestObject => {
            let group = track.latest_group().ok_or(EngineError::GroupDoesNotExist)?;
            let start = group.latest_registered_object().unwrap_or(ObjectId(0));
            Ok(vec![MinorSubscriptionState::new(group.clone(), group.id(), start, None, true)])
        }

        FilterType::AbsoluteStart => {
            // No end bound at all for this filter; every minor it creates
            // - including the first - stays open-ended.
            let start = body.start.ok_or(EngineError::GroupDoesNotExist)?;
            let g0 = track.get_group(start.group_id).ok_or(EngineError::GroupDoesNotExist)?;

            let mut minors = vec![MinorSubscriptionState::new(g0.clone(), g0.id(), start.object_id, None, true)];
            let mut cursor = g0.id();
            while let Some(g) = track.next_group(cursor) {
                let first = g.first_object_id().unwrap_or(ObjectId(0));
                cursor = g.id();
                minors.push(MinorSubscriptionState::new(g.clone(), g.id(), first, None, true));
            }
            Ok(minors)
        }

        FilterType::AbsoluteRange => {
            // Both ends are explicit, so this is a bounded historical
            // query: intermediate groups (and g0, when it isn't also g1)
            // are capped at whatever they'd already registered when the
            // subscription was created, rather than followed live - only
            // g1 carries the filter's own terminal object-id.
            let start = body.start.ok_or(EngineError::GroupDoesNotExist)?;
            let end = body.end.ok_or(EngineError::GroupDoesNotExist)?;
            let g0 = track.get_group(start.group_id).ok_or(EngineError::GroupDoesNotExist)?;

            if start.group_id == end.group_id {
                return Ok(vec![MinorSubscriptionState::new(
                    g0.clone(),
                    g0.id(),
                    start.object_id,
                    Some(end.object_id),
                    true,
                )]);
            }

            let mut minors = Vec::new();
            let g0_terminal = g0.latest_registered_object().unwrap_or(start.object_id);
            minors.push(MinorSubscriptionState::new(g0.clone(), g0.id(), start.object_id, Some(g0_terminal), true));

            let mut cursor = g0.id();
            loop {
                let g = track.next_group(cursor).ok_or(EngineError::GroupDoesNotExist)?;
                let first = g.first_object_id().unwrap_or(ObjectId(0));
                if g.id() == end.group_id {
                    minors.push(MinorSubscriptionState::new(g.clone(), g.id(), first, Some(end.object_id), true));
                    break;
                }
                let terminal = g.latest_registered_object().unwrap_or(first);
                minors.push(MinorSubscriptionState::new(g.clone(), g.id(), first, Some(terminal), true));
                cursor = g.id();
            }
            Ok(minors)
        }

        FilterType::LatestPerGroupInTrack => {
            let mut minors = Vec::new();
            let mut current = track.first_group();
            while let Some(g) = current {
                let start = g.latest_concrete_object().unwrap_or(ObjectId(0));
                let cursor = g.id();
                minors.push(MinorSubscriptionState::new(g.clone(), g.id(), start, None, false));
                current = track.next_group(cursor);
            }
            Ok(minors)
        }
    }
}

struct EngineShared {
    store: DataStore,
    queue: Mutex<VecDeque<PendingSubscription>>,
    cancelled: Mutex<HashSet<SubscribeId>>,
    notify: Notify,
    shutdown: AtomicBool,
}

/// The subscription engine's shared handle; cheap to clone, one instance
/// per relay. Spawn `run_worker` on as many tasks as the configured worker
/// count (spec.md §4.6 "fixed-size worker pool").
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineShared>,
}

impl Engine {
    pub fn new(store: DataStore) -> Self {
        Self {
            inner: Arc::new(EngineShared {
                store,
                queue: Mutex::new(VecDeque::new()),
                cancelled: Mutex::new(HashSet::new()),
                notify: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueues a freshly received SUBSCRIBE for the next idle worker.
    pub fn submit(&self, connection: WeakConnection, track: Arc<TrackIdentifier>, body: SubscribeBody) {
        self.inner.queue.lock().push_back(PendingSubscription { connection, track, body });
        self.inner.notify.notify_one();
    }

    /// Explicit UNSUBSCRIBE from the peer (spec.md §4.6 "Cancellation").
    pub fn cancel(&self, subscribe_id: SubscribeId) {
        self.inner.cancelled.lock().insert(subscribe_id);
        self.inner.notify.notify_waiters();
    }

    /// Engine shutdown: every worker releases its subscriptions without
    /// partial transmissions left pending.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Runs one worker's fulfilment loop until `shutdown` is called. Safe
    /// to spawn concurrently; each call owns an independent local
    /// collection of subscriptions (spec.md §4.6).
    pub async fn run_worker(&self) {
        let mut local: Vec<SubscriptionState> = Vec::new();

        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return;
            }

            let drained: Vec<PendingSubscription> = {
                let mut queue = self.inner.queue.lock();
                queue.drain(..).collect()
            };
            for pending in drained {
                match SubscriptionState::new(&self.inner.store, pending) {
                    Ok(state) => local.push(state),
                    Err((pending, err)) => {
                        let rejected = SubscriptionState {
                            subscribe_id: pending.body.subscribe_id,
                            track_alias: pending.body.track_alias,
                            connection: pending.connection,
                            minors: Vec::new(),
                            status: SubscriptionStatus::Errored,
                            subscribe_timeout: None,
                            error: Some(err),
                        };
                        rejected.notify_error();
                    }
                }
            }

            {
                let mut cancelled = self.inner.cancelled.lock();
                if !cancelled.is_empty() {
                    for sub in &mut local {
                        if cancelled.remove(&sub.subscribe_id) {
                            sub.status = SubscriptionStatus::Cancelled;
                        }
                    }
                }
            }

            let mut made_progress = false;
            local.retain_mut(|sub| {
                let was_active = sub.status == SubscriptionStatus::Active;
                if was_active {
                    sub.fulfill_some();
                    made_progress = true;
                }
                match sub.status {
                    SubscriptionStatus::Errored => {
                        sub.notify_error();
                        false
                    }
                    SubscriptionStatus::Cancelled | SubscriptionStatus::Done => false,
                    SubscriptionStatus::Active => true,
                }
            });

            if !made_progress {
                tokio::select! {
                    _ = self.inner.notify.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(20)) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, Role};
    use crate::ids::{Location, PublisherPriority, SubscriberPriority};
    use crate::transport::{ConnectionId, StreamDirection, StreamId, Transport, TransportError};
    use crate::GroupOrder;
    use bytes::Bytes;
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

    fn sample_body(track_alias: TrackAlias, filter_type: FilterType, start: Option<Location>, end: Option<Location>) -> SubscribeBody {
        SubscribeBody {
            subscribe_id: SubscribeId(1),
            track_alias,
            track_namespace: crate::coding::Tuple::from(vec!["ns"]),
            track_name: "track".to_string(),
            subscriber_priority: SubscriberPriority(0),
            group_order: GroupOrder::Ascending,
            filter_type,
            start,
            end,
            params: crate::coding::Parameters::new(),
        }
    }

    #[tokio::test]
    async fn latest_group_forwards_existing_objects_to_the_connection() {
        let store = DataStore::new();
        let track_id = TrackIdentifier::new(crate::coding::Tuple::from(vec!["ns"]), "track");
        let track = store.get_or_create_track(track_id.clone(), PublisherPriority(0), None);
        let group = track.add_group(GroupId(0), PublisherPriority(0), None);
        let sub = group.add_subgroup(2).unwrap();
        sub.add_object(Bytes::from_static(b"a")).unwrap();
        sub.add_object(Bytes::from_static(b"b")).unwrap();

        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport.clone(), Role::Publisher);

        let engine = Engine::new(store);
        engine.submit(
            connection.downgrade(),
            track_id,
            sample_body(TrackAlias(7), FilterType::LatestGroup, None, None),
        );

        let worker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_worker().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.sent.lock().len(), 2);
        assert!(connection.can_send_object(TrackAlias(7), GroupId(0), ObjectId(2)));

        engine.shutdown();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn missing_group_notifies_subscribe_error() {
        let store = DataStore::new();
        let track_id = TrackIdentifier::new(crate::coding::Tuple::from(vec!["ns"]), "track");
        store.get_or_create_track(track_id.clone(), PublisherPriority(0), None);

        let transport = Arc::new(RecordingTransport::new());
        let connection = Connection::new(ConnectionId(0), transport.clone(), Role::Publisher);
        connection.establish_control_stream().unwrap();

        let engine = Engine::new(store);
        engine.submit(
            connection.downgrade(),
            track_id,
            sample_body(TrackAlias(1), FilterType::LatestGroup, None, None),
        );

        let worker = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run_worker().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // establish_control_stream's open_stream call plus the
        // SUBSCRIBE_ERROR send land on the same recorded stream.
        assert!(transport.sent.lock().iter().any(|(_, bytes)| !bytes.is_empty()));

        engine.shutdown();
        worker.await.unwrap();
    }
}
