//! Bridges an upstream SUBSCRIBE into the store backing this relay's own
//! publisher endpoint, so a track this relay mirrors from another relay
//! becomes visible to its own downstream subscribers (grounded on
//! `moq-relay-ietf/src/local.rs`'s namespace registry and `producer.rs`'s
//! per-track forwarding loop - adapted to this core's group/subgroup model
//! rather than `moq-transport`'s `serve::TracksReader`).

use std::collections::HashMap;
use std::sync::Arc;

use moqt_core::coding::Tuple;
use moqt_core::coding::Parameters;
use moqt_core::endpoint::Endpoint;
use moqt_core::connection::Connection;
use moqt_core::store::{DataStore, GroupHandle, SubgroupHandle};
use moqt_core::message::{FilterType, SubscribeBody};
use moqt_core::{GroupId, GroupOrder, PublisherPriority, SubscribeId, SubscriberPriority, TrackAlias, TrackIdentifier};

/// Subscribes to one track on `connection` (an upstream relay) and copies
/// every object it delivers into `store`, where this relay's own publisher
/// endpoint serves it to downstream subscribers. Runs until the upstream
/// subscription ends (peer SUBSCRIBE_ERROR, UNSUBSCRIBE, or connection loss).
pub async fn mirror_track(
    client: Endpoint,
    connection: Arc<Connection>,
    store: DataStore,
    namespace: Tuple,
    name: String,
    subscribe_id: SubscribeId,
) -> anyhow::Result<()> {
    let id = TrackIdentifier::new(namespace, name);

    let body = SubscribeBody {
        subscribe_id,
        track_alias: TrackAlias(0),
        track_namespace: id.namespace.clone(),
        track_name: id.name.clone(),
        subscriber_priority: SubscriberPriority(0),
        group_order: GroupOrder::Publisher,
        filter_type: FilterType::LatestGroup,
        start: None,
        end: None,
        params: Parameters::new(),
    };

    let handle = client.subscribe(&connection, body).await?;
    log::info!("mirroring {id} from upstream");

    let track = store.get_or_create_track(id.clone(), PublisherPriority(0), None);
    let mut subgroups: HashMap<GroupId, SubgroupHandle> = HashMap::new();

    while let Some(object) = handle.recv().await {
        let group = track.add_group(object.group_id, PublisherPriority(0), None);
        let Some(subgroup) = subgroup_for(&group, &mut subgroups, object.group_id) else {
            continue;
        };
        if let Err(err) = subgroup.add_object(object.payload) {
            log::warn!("failed to mirror object in {id} group {}: {err}", object.group_id);
        }
    }

    log::info!("upstream subscription for {id} ended");
    Ok(())
}

/// Returns this group's cached open subgroup, opening one the first time a
/// group is seen (spec.md §9: at most one open-ended subgroup per group).
fn subgroup_for<'a>(
    group: &GroupHandle,
    cache: &'a mut HashMap<GroupId, SubgroupHandle>,
    group_id: GroupId,
) -> Option<&'a SubgroupHandle> {
    if !cache.contains_key(&group_id) {
        match group.add_open_ended_subgroup() {
            Ok(subgroup) => {
                cache.insert(group_id, subgroup);
            }
            Err(err) => {
                log::warn!("failed to open a subgroup for group {group_id}: {err}");
                return None;
            }
        }
    }
    cache.get(&group_id)
}
