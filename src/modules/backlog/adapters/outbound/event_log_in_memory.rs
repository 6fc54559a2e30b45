use crate::modules::backlog::adapters::outbound::event_log::{EventLog, EventLogError};
use crate::modules::backlog::core::events::DomainEvent;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<DomainEvent>>,
    is_offline: bool,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&mut self) {
        self.is_offline = !self.is_offline;
    }

    fn check_online(&self) -> Result<(), EventLogError> {
        if self.is_offline {
            return Err(EventLogError::Backend("Event log offline".into()));
        }
        Ok(())
    }
}

fn chronological(mut events: Vec<DomainEvent>) -> Vec<DomainEvent> {
    events.sort_by_key(|e| (e.timestamp, e.id));
    events
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventLog {
    async fn store_event(&self, event: &DomainEvent) -> Result<(), EventLogError> {
        self.check_online()?;
        let mut guard = self.events.write().await;
        if guard.iter().any(|e| e.id == event.id) {
            return Err(EventLogError::Duplicate(event.id));
        }
        guard.push(event.clone());
        Ok(())
    }

    async fn events_for_item(&self, item_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError> {
        self.check_online()?;
        let events = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.item_id == Some(item_id))
            .cloned()
            .collect();
        Ok(chronological(events))
    }

    async fn all_events(&self) -> Result<Vec<DomainEvent>, EventLogError> {
        self.check_online()?;
        Ok(chronological(self.events.read().await.clone()))
    }
}

#[cfg(test)]
mod in_memory_event_log_tests {
    use super::*;
    use crate::modules::backlog::core::item::{BacklogItem, ItemType};
    use rstest::{fixture, rstest};
    use std::collections::BTreeMap;

    #[fixture]
    fn before_each() -> (InMemoryEventLog, BacklogItem) {
        let item = BacklogItem::new(ItemType::Story, "s", None, 0).unwrap();
        (InMemoryEventLog::new(), item)
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_return_an_items_events_oldest_first(
        before_each: (InMemoryEventLog, BacklogItem),
    ) {
        let (log, item) = before_each;
        let updated = DomainEvent::item_updated(&item, 20);
        let created = DomainEvent::item_created(&item, 10);
        log.store_event(&updated).await.unwrap();
        log.store_event(&created).await.unwrap();
        log.store_event(&DomainEvent::items_reordered(BTreeMap::new(), 15))
            .await
            .unwrap();

        let events = log.events_for_item(item.id).await.unwrap();

        assert_eq!(events, vec![created, updated]);
        assert_eq!(log.all_events().await.unwrap().len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_to_store_the_same_event_twice(
        before_each: (InMemoryEventLog, BacklogItem),
    ) {
        let (log, item) = before_each;
        let event = DomainEvent::item_created(&item, 10);
        log.store_event(&event).await.unwrap();
        assert!(matches!(
            log.store_event(&event).await,
            Err(EventLogError::Duplicate(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_if_offline(before_each: (InMemoryEventLog, BacklogItem)) {
        let (mut log, item) = before_each;
        log.toggle_offline();
        let result = log.store_event(&DomainEvent::item_created(&item, 0)).await;
        assert!(matches!(result, Err(EventLogError::Backend(_))));
    }
}
