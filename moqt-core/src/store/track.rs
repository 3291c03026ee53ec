use super::GroupHandle;
use crate::ids::{GroupId, PublisherPriority, TrackIdentifier};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

struct TrackInner {
    id: Arc<TrackIdentifier>,
    #[allow(dead_code)]
    priority: PublisherPriority,
    #[allow(dead_code)]
    timeout: Option<Duration>,
    groups: RwLock<BTreeMap<u64, GroupHandle>>,
}

/// A shared handle to one track's groups (spec.md §3 "Hierarchy").
#[derive(Clone)]
pub struct TrackHandle {
    inner: Arc<TrackInner>,
}

impl TrackHandle {
    pub(super) fn new(
        id: Arc<TrackIdentifier>,
        priority: PublisherPriority,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id,
                priority,
                timeout,
                groups: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn id(&self) -> &Arc<TrackIdentifier> {
        &self.inner.id
    }

    /// A weak reference to the track's identifier, for a child handle that
    /// needs to name its parent without extending its lifetime.
    pub fn downgrade_id(&self) -> Weak<TrackIdentifier> {
        Arc::downgrade(&self.inner.id)
    }

    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Idempotent per group-id (spec.md §3 invariant 1).
    pub fn add_group(
        &self,
        group_id: GroupId,
        priority: PublisherPriority,
        timeout: Option<Duration>,
    ) -> GroupHandle {
        if let Some(existing) = self.inner.groups.read().get(&group_id.get()) {
            return existing.clone();
        }

        let mut groups = self.inner.groups.write();
        groups
            .entry(group_id.get())
            .or_insert_with(|| GroupHandle::new(self.clone(), group_id, priority, timeout))
            .clone()
    }

    pub fn get_group(&self, group_id: GroupId) -> Option<GroupHandle> {
        self.inner.groups.read().get(&group_id.get()).cloned()
    }

    pub fn first_group(&self) -> Option<GroupHandle> {
        self.inner.groups.read().values().next().cloned()
    }

    /// The highest-numbered group registered so far, used by the
    /// subscription engine to locate a track's "current" group for
    /// LatestGroup/LatestObject filters (spec.md §4.6).
    pub fn latest_group(&self) -> Option<GroupHandle> {
        self.inner.groups.read().values().next_back().cloned()
    }

    /// The lowest existing group-id strictly greater than `after`.
    pub fn next_group(&self, after: GroupId) -> Option<GroupHandle> {
        self.inner
            .groups
            .read()
            .range((
                std::ops::Bound::Excluded(after.get()),
                std::ops::Bound::Unbounded,
            ))
            .next()
            .map(|(_, g)| g.clone())
    }

    pub fn remove_group(&self, group_id: GroupId) {
        self.inner.groups.write().remove(&group_id.get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> TrackHandle {
        TrackHandle::new(
            TrackIdentifier::new(crate::coding::Tuple::from(vec!["ns"]), "track"),
            PublisherPriority(0),
            None,
        )
    }

    #[test]
    fn add_group_is_idempotent_per_id() {
        let t = track();
        let a = t.add_group(GroupId(3), PublisherPriority(0), None);
        let b = t.add_group(GroupId(3), PublisherPriority(0), None);
        assert_eq!(a.id(), b.id());
        assert_eq!(t.first_group().unwrap().id(), GroupId(3));
    }

    #[test]
    fn next_group_and_latest_group_walk_in_id_order() {
        let t = track();
        t.add_group(GroupId(1), PublisherPriority(0), None);
        t.add_group(GroupId(5), PublisherPriority(0), None);
        t.add_group(GroupId(3), PublisherPriority(0), None);

        assert_eq!(t.latest_group().unwrap().id(), GroupId(5));
        assert_eq!(t.next_group(GroupId(1)).unwrap().id(), GroupId(3));
        assert_eq!(t.next_group(GroupId(3)).unwrap().id(), GroupId(5));
        assert!(t.next_group(GroupId(5)).is_none());
    }
}
