use super::{Object, StoreError, WeakGroupHandle};
use crate::ids::{ObjectId, PublisherPriority};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A reserved, contiguous range of object-ids within one group (spec.md
/// §4.4). Object-ids are allocated with a relaxed atomic fetch-add as
/// producers call `add_object`; the terminal `capped` flag is
/// release/acquire so a reader observing it sees every object written
/// before the cap (spec.md §9 "Concurrent-increment / wait-free hot
/// paths").
pub struct SubgroupHandle {
    group: WeakGroupHandle,
    begin: u64,
    end: Option<u64>,
    next: AtomicU64,
    capped: AtomicBool,
}

impl SubgroupHandle {
    pub(super) fn new(group: WeakGroupHandle, begin: u64, end: Option<u64>) -> Self {
        Self {
            group,
            begin,
            end,
            next: AtomicU64::new(begin),
            capped: AtomicBool::new(false),
        }
    }

    pub fn begin(&self) -> ObjectId {
        ObjectId(self.begin)
    }

    /// Appends the next object in the subgroup.
    pub fn add_object(&self, bytes: Bytes) -> Result<ObjectId, StoreError> {
        self.add_object_with(bytes, None, PublisherPriority::default())
    }

    pub fn add_object_with(
        &self,
        bytes: Bytes,
        delivery_timeout: Option<Duration>,
        publisher_priority: PublisherPriority,
    ) -> Result<ObjectId, StoreError> {
        if self.capped.load(Ordering::Acquire) {
            return Err(StoreError::Capped);
        }

        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if let Some(end) = self.end {
            if id >= end {
                // Undo: this subgroup is exhausted, don't leak the reservation.
                self.next.fetch_sub(1, Ordering::Relaxed);
                return Err(StoreError::RangeExhausted);
            }
        }
        if id > ObjectId::MAX {
            self.next.fetch_sub(1, Ordering::Relaxed);
            return Err(StoreError::ObjectIdOutOfRange(id));
        }

        let Some(group) = self.group.upgrade() else {
            // Group already gone: a no-op per spec.md §9, not an error -
            // the producer just wasted a reservation slot.
            return Ok(ObjectId(id));
        };
        group.store_object(
            id,
            Object {
                payload: bytes,
                delivery_timeout,
                publisher_priority,
            },
        );
        Ok(ObjectId(id))
    }

    /// Closes the range at the current length. Idempotent.
    pub fn cap(&self) {
        let was_open = self.end.is_none();
        if self.capped.swap(true, Ordering::Release) {
            return;
        }
        let new_end = self.next.load(Ordering::Relaxed);
        if let Some(group) = self.group.upgrade() {
            group.cap_range(self.begin, new_end, was_open);
        }
    }

    /// Caps this subgroup and, if it was the group's open-ended tail,
    /// immediately reserves a fresh open-ended subgroup continuing from
    /// the cap point so a producer can keep streaming without a gap.
    pub fn cap_and_next(&self) -> Option<Self> {
        let was_open = self.end.is_none();
        self.cap();
        if !was_open {
            return None;
        }
        self.group.upgrade()?.add_open_ended_subgroup().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::super::DataStore;
    use super::*;
    use crate::coding::Tuple;
    use crate::ids::{GroupId, TrackIdentifier};

    fn fresh_group() -> super::super::GroupHandle {
        let store = DataStore::new();
        let track = store.get_or_create_track(
            TrackIdentifier::new(Tuple::from(vec!["ns"]), "t"),
            PublisherPriority(0),
            None,
        );
        track.add_group(GroupId(0), PublisherPriority(0), None)
    }

    #[test]
    fn closed_range_rejects_past_end() {
        let group = fresh_group();
        let sg = group.add_subgroup(2).unwrap();
        sg.add_object(Bytes::from_static(b"a")).unwrap();
        sg.add_object(Bytes::from_static(b"b")).unwrap();
        assert!(matches!(
            sg.add_object(Bytes::from_static(b"c")),
            Err(StoreError::RangeExhausted)
        ));
    }

    #[test]
    fn cap_is_idempotent() {
        let group = fresh_group();
        let sg = group.add_open_ended_subgroup().unwrap();
        sg.add_object(Bytes::from_static(b"a")).unwrap();
        sg.cap();
        sg.cap();
        assert!(matches!(
            sg.add_object(Bytes::from_static(b"b")),
            Err(StoreError::Capped)
        ));
    }

    #[test]
    fn object_ids_are_dense_and_increasing() {
        let group = fresh_group();
        let sg = group.add_subgroup(3).unwrap();
        let a = sg.add_object(Bytes::from_static(b"1")).unwrap();
        let b = sg.add_object(Bytes::from_static(b"2")).unwrap();
        let c = sg.add_object(Bytes::from_static(b"3")).unwrap();
        assert_eq!([a.get(), b.get(), c.get()], [0, 1, 2]);
    }

    #[test]
    fn only_one_open_range_at_a_time() {
        let group = fresh_group();
        let _open = group.add_open_ended_subgroup().unwrap();
        assert!(matches!(
            group.add_subgroup(1),
            Err(StoreError::OpenRangePending)
        ));
    }
}
