//! The hierarchical data store (C4): tracks -> groups -> subgroups ->
//! objects, with reader-writer locks per level and wait-signals for
//! not-yet-available objects (spec.md §3, §4.4).
//!
//! Ownership runs strong parent -> child (the store holds `Arc<TrackHandle>`
//! while a track is registered, a track holds `Arc<GroupInner>` per group);
//! children keep a `Weak` back-reference to their parent so a subgroup
//! outliving its group (because the group was removed from the store while
//! a producer still held the subgroup handle) observes that as a no-op
//! rather than a dangling access (spec.md §9 "Cyclic ownership").

mod group;
mod subgroup;
mod track;

pub use group::{GroupHandle, WeakGroupHandle};
pub use subgroup::SubgroupHandle;
pub use track::TrackHandle;

use crate::ids::{GroupId, ObjectId, PublisherPriority, TrackIdentifier};
use crate::watch::WaitSignal;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone)]
pub enum StoreError {
    #[error("track does not exist")]
    TrackDoesNotExist,

    #[error("group does not exist")]
    GroupDoesNotExist,

    #[error("object does not exist")]
    ObjectDoesNotExist,

    #[error("subgroup has been capped")]
    Capped,

    #[error("subgroup's reserved range is exhausted")]
    RangeExhausted,

    #[error("an open-ended subgroup is already pending for this group; cap it first")]
    OpenRangePending,

    #[error("object-id {0} exceeds the 63-bit ceiling (spec.md §9)")]
    ObjectIdOutOfRange(u64),
}

/// A stored payload plus the metadata the store remembers about it.
#[derive(Clone, Debug)]
pub struct Object {
    pub payload: Bytes,
    pub delivery_timeout: Option<Duration>,
    pub publisher_priority: PublisherPriority,
}

/// The result of asking the store for an object that may not exist yet.
pub enum Lookup {
    Ready(Arc<Object>),
    DoesNotExist,
    Wait(WaitSignal),
}

struct StoreState {
    tracks: HashMap<Arc<TrackIdentifier>, TrackHandle>,
}

/// Root of the hierarchy. Cheap to clone (an `Arc` internally); all
/// operations are safe to call from multiple threads concurrently.
#[derive(Clone)]
pub struct DataStore {
    state: Arc<RwLock<StoreState>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState {
                tracks: HashMap::new(),
            })),
        }
    }

    /// Idempotent: a second call with the same identifier returns the
    /// handle created by the first (spec.md §3 invariant 1).
    pub fn get_or_create_track(
        &self,
        id: Arc<TrackIdentifier>,
        priority: PublisherPriority,
        timeout: Option<Duration>,
    ) -> TrackHandle {
        if let Some(existing) = self.state.read().tracks.get(&id) {
            return existing.clone();
        }

        let mut state = self.state.write();
        state
            .tracks
            .entry(id.clone())
            .or_insert_with(|| TrackHandle::new(id, priority, timeout))
            .clone()
    }

    pub fn get_track(&self, id: &TrackIdentifier) -> Option<TrackHandle> {
        self.state.read().tracks.get(id).cloned()
    }

    /// Drops the store's strong reference. The track's resources are
    /// reclaimed once every external handle has also been dropped
    /// (spec.md §3 "Lifecycle").
    pub fn remove_track(&self, id: &TrackIdentifier) {
        self.state.write().tracks.remove(id);
    }

    pub fn get_object(&self, oid: &crate::ids::ObjectIdentifier) -> Lookup {
        let Some(track) = self.get_track(oid.track()) else {
            return Lookup::DoesNotExist;
        };
        let Some(group) = track.get_group(oid.group_id()) else {
            return Lookup::DoesNotExist;
        };
        group.get_object(oid.object_id)
    }

    pub fn get_first_group(&self, id: &TrackIdentifier) -> Option<GroupHandle> {
        self.get_track(id).and_then(|t| t.first_group())
    }

    /// Advances `group_id`/`object_id` forward by `by` within the group;
    /// if the group has no larger id, wraps to the first object of the
    /// next existing group of the same track. Returns `false` if there is
    /// no successor at all.
    pub fn next(
        &self,
        track: &Arc<TrackIdentifier>,
        group_id: &mut GroupId,
        object_id: &mut ObjectId,
        by: u64,
    ) -> bool {
        let Some(t) = self.get_track(track) else {
            return false;
        };
        let Some(group) = t.get_group(*group_id) else {
            return false;
        };

        let candidate = object_id.get() + by;
        if let Some(next_id) = group.next_existing_object_id(candidate) {
            *object_id = next_id;
            return true;
        }

        let Some(next_group) = t.next_group(*group_id) else {
            return false;
        };
        let Some(first) = next_group.first_object_id() else {
            return false;
        };
        *group_id = next_group.id();
        *object_id = first;
        true
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Tuple;

    fn track_id() -> Arc<TrackIdentifier> {
        TrackIdentifier::new(Tuple::from(vec!["ns"]), "track")
    }

    #[test]
    fn get_or_create_track_is_idempotent() {
        let store = DataStore::new();
        let id = track_id();
        let a = store.get_or_create_track(id.clone(), PublisherPriority(0), None);
        let b = store.get_or_create_track(id.clone(), PublisherPriority(0), None);
        assert!(a.same_handle(&b));
    }

    #[test]
    fn missing_track_is_does_not_exist() {
        let store = DataStore::new();
        let oid = crate::ids::ObjectIdentifier {
            group: crate::ids::GroupIdentifier {
                track: track_id(),
                group_id: GroupId(0),
            },
            object_id: ObjectId(0),
        };
        assert!(matches!(store.get_object(&oid), Lookup::DoesNotExist));
    }

    /// Synthetic per-layer object generator used to drive store tests under
    /// a multi-track workload, mirroring the original implementation's
    /// `ObjectGeneratorFactory` (bitrate doubling per layer, one track per
    /// layer - `TrackGranularity`).
    struct ObjectGenerator {
        namespace: Tuple,
        base_bit_rate: u64,
        ms_between_objects: u64,
    }

    impl ObjectGenerator {
        fn new(namespace: Tuple, base_bit_rate: u64, ms_between_objects: u64) -> Self {
            Self {
                namespace,
                base_bit_rate,
                ms_between_objects,
            }
        }

        fn object_size(&self, layer: u32) -> usize {
            let bit_rate = self.base_bit_rate << layer;
            let bytes_per_second = bit_rate / 8;
            ((bytes_per_second * self.ms_between_objects) / 1000) as usize
        }

        /// Feeds `objects_per_layer` objects, each embedding its own
        /// sequence number, into group 0 of one track per layer.
        fn populate(&self, store: &DataStore, layers: u8, objects_per_layer: u64) {
            for layer in 0..layers {
                let track = store.get_or_create_track(
                    TrackIdentifier::new(self.namespace.clone(), layer.to_string()),
                    PublisherPriority(layer),
                    None,
                );
                let group = track.add_group(GroupId(0), PublisherPriority(layer), None);
                let subgroup = group.add_open_ended_subgroup().unwrap();

                let size = self.object_size(u32::from(layer)).max(8);
                for counter in 0..objects_per_layer {
                    let mut payload = vec![0u8; size];
                    payload[..8].copy_from_slice(&counter.to_le_bytes());
                    subgroup.add_object(Bytes::from(payload)).unwrap();
                }
            }
        }
    }

    #[test]
    fn object_generator_populates_every_layer() {
        let store = DataStore::new();
        let namespace = Tuple::from(vec!["namespace1", "namespace2", "namespace3"]);
        let generator = ObjectGenerator::new(namespace.clone(), 1_000_000, 20);
        generator.populate(&store, 3, 5);

        for layer in 0..3u8 {
            let track = store
                .get_track(&TrackIdentifier {
                    namespace: namespace.clone(),
                    name: layer.to_string(),
                })
                .expect("populate() created this track");
            let group = track.get_group(GroupId(0)).expect("populate() created this group");
            assert_eq!(group.first_object_id(), Some(ObjectId(0)));
            assert_eq!(group.latest_concrete_object(), Some(ObjectId(4)));
        }
    }
}
