use super::track::TrackHandle;
use super::{Lookup, Object, StoreError, SubgroupHandle};
use crate::ids::{GroupId, ObjectId, PublisherPriority};
use crate::watch::WaitSignal;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A `begin`/`end` sentinel in a group's reservation timeline. Sorted by
/// `value` first and `end` second, so `begin(v)` always precedes `end(v)`
/// for the same `v` - the ordered-set comparator spec.md §4.4 describes,
/// expressed as a plain derived `Ord` on a tuple rather than a bit-packed
/// integer key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
struct Boundary {
    value: u64,
    end: bool,
}

impl Boundary {
    fn begin(v: u64) -> Self {
        Self { value: v, end: false }
    }
    fn end(v: u64) -> Self {
        Self { value: v, end: true }
    }
}

#[derive(Clone, Copy, Debug)]
struct Range {
    begin: u64,
    /// `None` while the subgroup that reserved this range is still open.
    end: Option<u64>,
}

struct GroupState {
    priority: PublisherPriority,
    #[allow(dead_code)]
    timeout: Option<Duration>,
    cursor: u64,
    has_open_range: bool,
    ranges: Vec<Range>,
    // Maintained alongside `ranges` as the ordered-set spec.md §4.4
    // describes; `ranges` is small enough in practice (one entry per live
    // subgroup) that lookups scan it directly rather than walking this set.
    boundaries: BTreeSet<Boundary>,
    objects: BTreeMap<u64, Arc<Object>>,
    waiters: HashMap<u64, WaitSignal>,
}

struct GroupInner {
    /// Weak back-reference to the owning track's identifier (spec.md §9
    /// "Cyclic ownership"); unused by any operation implemented so far but
    /// kept so a future operation can name the parent without reviving it.
    #[allow(dead_code)]
    track: Weak<crate::ids::TrackIdentifier>,
    id: GroupId,
    state: RwLock<GroupState>,
}

/// A shared handle to one group's subgroups and objects.
#[derive(Clone)]
pub struct GroupHandle {
    inner: Arc<GroupInner>,
}

/// A weak back-reference from a subgroup handle to its group, so capping a
/// subgroup whose group has already been dropped from the store is an
/// observable no-op (spec.md §9 "Cyclic ownership").
#[derive(Clone)]
pub struct WeakGroupHandle {
    inner: Weak<GroupInner>,
}

impl WeakGroupHandle {
    pub fn upgrade(&self) -> Option<GroupHandle> {
        self.inner.upgrade().map(|inner| GroupHandle { inner })
    }
}

impl GroupHandle {
    pub(super) fn new(
        track: TrackHandle,
        id: GroupId,
        priority: PublisherPriority,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                track: track.downgrade_id(),
                id,
                state: RwLock::new(GroupState {
                    priority,
                    timeout,
                    cursor: 0,
                    has_open_range: false,
                    ranges: Vec::new(),
                    boundaries: BTreeSet::new(),
                    objects: BTreeMap::new(),
                    waiters: HashMap::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> GroupId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakGroupHandle {
        WeakGroupHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn priority(&self) -> PublisherPriority {
        self.inner.state.read().priority
    }

    /// Reserves `[cursor, cursor + n)` for a new subgroup.
    pub fn add_subgroup(&self, n_objects: u64) -> Result<SubgroupHandle, StoreError> {
        let mut state = self.inner.state.write();
        if state.has_open_range {
            return Err(StoreError::OpenRangePending);
        }
        let begin = state.cursor;
        let end = begin + n_objects;
        state.cursor = end;
        state.ranges.push(Range { begin, end: Some(end) });
        state.boundaries.insert(Boundary::begin(begin));
        state.boundaries.insert(Boundary::end(end));
        drop(state);

        Ok(SubgroupHandle::new(self.downgrade(), begin, Some(end)))
    }

    /// Reserves `[cursor, ..)`; the end is fixed later by `cap`.
    pub fn add_open_ended_subgroup(&self) -> Result<SubgroupHandle, StoreError> {
        let mut state = self.inner.state.write();
        if state.has_open_range {
            return Err(StoreError::OpenRangePending);
        }
        let begin = state.cursor;
        state.has_open_range = true;
        state.ranges.push(Range { begin, end: None });
        state.boundaries.insert(Boundary::begin(begin));
        drop(state);

        Ok(SubgroupHandle::new(self.downgrade(), begin, None))
    }

    /// Called by `SubgroupHandle::add_object`: stores the payload at
    /// `id`, releasing any wait-signal registered for it.
    pub(super) fn store_object(&self, id: u64, object: Object) {
        let mut state = self.inner.state.write();
        state.objects.insert(id, Arc::new(object));
        // `add_subgroup` already advances `cursor` to the reserved range's
        // end, so this is a no-op there; for an open-ended range `cursor`
        // only reflects the begin of the reservation, so the high-water
        // mark has to be raised here as objects actually land (spec.md:118
        // "highest reserved id").
        state.cursor = state.cursor.max(id + 1);
        if let Some(signal) = state.waiters.remove(&id) {
            signal.release();
        }
    }

    /// Called by `SubgroupHandle::cap`: fixes a previously open range's end
    /// and releases, as "will never exist", any waiter whose id falls in
    /// the now-unreachable tail `[new_end, old_end)`.
    pub(super) fn cap_range(&self, begin: u64, new_end: u64, was_open: bool) {
        let mut state = self.inner.state.write();
        if let Some(r) = state.ranges.iter_mut().find(|r| r.begin == begin) {
            let old_end = r.end;
            r.end = Some(new_end);
            if was_open {
                state.has_open_range = false;
                state.boundaries.insert(Boundary::end(new_end));
            } else if let Some(old_end) = old_end {
                // Shrinking a previously-closed range (cap on a fixed-size
                // subgroup before it filled) isn't part of the public
                // surface today but kept consistent for completeness.
                if new_end < old_end {
                    state.boundaries.remove(&Boundary::end(old_end));
                    state.boundaries.insert(Boundary::end(new_end));
                }
            }
        }

        let stale: Vec<u64> = state
            .waiters
            .keys()
            .copied()
            .filter(|id| *id >= new_end)
            .filter(|id| state.ranges.iter().any(|r| r.begin == begin && *id >= begin))
            .collect();
        for id in stale {
            if let Some(signal) = state.waiters.remove(&id) {
                signal.release();
            }
        }
    }

    pub fn get_object(&self, id: ObjectId) -> Lookup {
        let v = id.get();
        let mut state = self.inner.state.write();
        if let Some(obj) = state.objects.get(&v) {
            return Lookup::Ready(obj.clone());
        }

        let covered = state.ranges.iter().any(|r| {
            r.begin <= v && r.end.map_or(true, |e| v < e)
        });
        if covered || v >= state.cursor {
            let signal = state
                .waiters
                .entry(v)
                .or_insert_with(WaitSignal::new)
                .clone();
            Lookup::Wait(signal)
        } else {
            Lookup::DoesNotExist
        }
    }

    pub fn first_object_id(&self) -> Option<ObjectId> {
        self.inner
            .state
            .read()
            .objects
            .keys()
            .next()
            .copied()
            .map(ObjectId)
    }

    pub fn latest_registered_object(&self) -> Option<ObjectId> {
        let state = self.inner.state.read();
        if state.cursor == 0 {
            None
        } else {
            Some(ObjectId(state.cursor - 1))
        }
    }

    pub fn latest_concrete_object(&self) -> Option<ObjectId> {
        self.inner
            .state
            .read()
            .objects
            .keys()
            .next_back()
            .copied()
            .map(ObjectId)
    }

    pub fn next_existing_object_id(&self, from: u64) -> Option<ObjectId> {
        self.inner
            .state
            .read()
            .objects
            .range(from..)
            .next()
            .map(|(id, _)| ObjectId(*id))
    }
}
