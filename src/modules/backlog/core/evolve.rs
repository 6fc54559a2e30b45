use crate::modules::backlog::core::events::{BacklogEvent, DomainEvent};
use crate::modules::backlog::core::item::BacklogItem;

/// Folds one audit event into the reconstructed item.
///
/// Updates carry full snapshots and overwrite wholesale. Deletes and batch
/// reorders are not folded into single-item state.
pub fn evolve(state: Option<BacklogItem>, event: &DomainEvent) -> Option<BacklogItem> {
    match (state, &event.payload) {
        (None, BacklogEvent::ItemCreated { item }) => Some(item.clone()),
        (Some(_), BacklogEvent::ItemUpdated { item }) => Some(item.clone()),
        (
            Some(mut current),
            BacklogEvent::ExternalIdSet {
                system,
                external_id,
            },
        ) => {
            current.set_external_id(system.clone(), external_id.clone());
            Some(current)
        }
        (state, _) => state,
    }
}

/// Rebuilds an item from its events in timestamp order. `None` when the
/// stream has no ITEM_CREATED.
pub fn replay(events: &[DomainEvent]) -> Option<BacklogItem> {
    let mut ordered: Vec<&DomainEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.timestamp, e.id));
    ordered.into_iter().fold(None, evolve)
}

#[cfg(test)]
mod backlog_evolve_tests {
    use super::*;
    use crate::modules::backlog::core::item::{ItemStatus, ItemType};
    use rstest::{fixture, rstest};
    use std::collections::BTreeMap;

    #[fixture]
    fn created() -> BacklogItem {
        BacklogItem::new(ItemType::Story, "Login page", None, 1_000).unwrap()
    }

    #[rstest]
    fn it_should_rebuild_the_last_update_snapshot(created: BacklogItem) {
        let mut first = created.clone();
        first.rename("Login page v2").unwrap();
        first.touch(2_000);
        let mut second = first.clone();
        second.status = ItemStatus::InProgress;
        second.touch(3_000);

        let events = vec![
            DomainEvent::item_created(&created, 1_000),
            DomainEvent::item_updated(&first, 2_000),
            DomainEvent::item_updated(&second, 3_000),
        ];

        assert_eq!(replay(&events), Some(second));
    }

    #[rstest]
    fn it_should_apply_events_in_timestamp_order(created: BacklogItem) {
        let mut later = created.clone();
        later.rename("later").unwrap();
        let mut earlier = created.clone();
        earlier.rename("earlier").unwrap();

        let events = vec![
            DomainEvent::item_updated(&later, 3_000),
            DomainEvent::item_created(&created, 1_000),
            DomainEvent::item_updated(&earlier, 2_000),
        ];

        assert_eq!(replay(&events).unwrap().title, "later");
    }

    #[rstest]
    fn it_should_upsert_external_ids(created: BacklogItem) {
        let events = vec![
            DomainEvent::item_created(&created, 1_000),
            DomainEvent::external_id_set(created.id, "jira", "J-1", 2_000),
            DomainEvent::external_id_set(created.id, "jira", "J-2", 3_000),
            DomainEvent::external_id_set(created.id, "github", "#9", 4_000),
        ];

        let item = replay(&events).unwrap();
        assert_eq!(item.external_ids.get("jira").map(String::as_str), Some("J-2"));
        assert_eq!(item.external_ids.get("github").map(String::as_str), Some("#9"));
    }

    #[rstest]
    fn it_should_ignore_deletes_and_reorders(created: BacklogItem) {
        let mut priorities = BTreeMap::new();
        priorities.insert(created.id, 42);
        let events = vec![
            DomainEvent::item_created(&created, 1_000),
            DomainEvent::items_reordered(priorities, 2_000),
            DomainEvent::item_deleted(&created, 3_000),
        ];

        assert_eq!(replay(&events), Some(created));
    }

    #[rstest]
    fn it_should_return_none_without_a_creation_event(created: BacklogItem) {
        let events = vec![DomainEvent::item_updated(&created, 2_000)];
        assert_eq!(replay(&events), None);
    }
}
