use crate::modules::backlog::application::commands::UpdateItem;
use crate::modules::backlog::application::errors::BacklogError;
use crate::modules::backlog::core::events::{DomainEvent, EventKind};
use crate::modules::backlog::core::filter::{ItemFilter, SortKey};
use crate::modules::backlog::core::item::{ItemStatus, ItemType};
use crate::modules::backlog::core::metrics::HealthStatus;
use crate::shared::infrastructure::message_bus::consumer::{EventConsumer, LoggingHandler};
use crate::shared::infrastructure::message_bus::in_memory::InMemoryMessageBus;
use crate::shared::infrastructure::message_bus::relay::NotificationRelay;
use crate::shared::infrastructure::message_bus::MessageBus;
use crate::tests::fixtures::{CreateItemBuilder, TestBackend};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Storage {
    Memory,
    Sqlite,
}

async fn backend(storage: Storage) -> TestBackend {
    let timeout = Duration::from_secs(5);
    match storage {
        Storage::Memory => TestBackend::in_memory(timeout).await,
        Storage::Sqlite => TestBackend::sqlite(timeout).await,
    }
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn builds_and_tears_down_a_hierarchy(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;

    let epic = service
        .create_item(CreateItemBuilder::epic().title("Payments").build())
        .await
        .unwrap();
    let feature = service
        .create_item(CreateItemBuilder::feature().parent(epic.id).build())
        .await
        .unwrap();
    let story = service
        .create_item(
            CreateItemBuilder::story()
                .parent(feature.id)
                .story_points(3)
                .tags(&["ux", "api"])
                .build(),
        )
        .await
        .unwrap();

    let misplaced = service
        .create_item(CreateItemBuilder::feature().parent(story.id).build())
        .await;
    assert!(matches!(
        misplaced,
        Err(BacklogError::InvalidRelationship { .. })
    ));

    let children = service.get_children(epic.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, feature.id);

    let kinds: Vec<EventKind> = backend
        .event_log
        .all_events()
        .await
        .unwrap()
        .iter()
        .map(DomainEvent::kind)
        .collect();
    assert_eq!(kinds, vec![EventKind::ItemCreated; 3]);

    assert!(matches!(
        service.delete_item(epic.id).await,
        Err(BacklogError::HasChildren(_))
    ));
    service.delete_item(story.id).await.unwrap();
    service.delete_item(feature.id).await.unwrap();
    service.delete_item(epic.id).await.unwrap();

    assert!(matches!(
        service.get_item(epic.id).await,
        Err(BacklogError::NotFound(_))
    ));
    assert_eq!(
        service.list_items(ItemFilter::default()).await.unwrap().total,
        0
    );
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn never_serves_a_stale_title_after_an_update(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;
    let story = service
        .create_item(CreateItemBuilder::story().title("Before").build())
        .await
        .unwrap();
    service.get_item(story.id).await.unwrap();
    service.list_items(ItemFilter::default()).await.unwrap();

    service
        .update_item(
            story.id,
            UpdateItem {
                title: Some("After".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(service.get_item(story.id).await.unwrap().title, "After");
    let page = service.list_items(ItemFilter::default()).await.unwrap();
    assert_eq!(page.items[0].title, "After");
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn lists_by_priority_after_a_reorder(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;
    let a = service
        .create_item(CreateItemBuilder::story().title("A").build())
        .await
        .unwrap();
    let b = service
        .create_item(CreateItemBuilder::story().title("B").build())
        .await
        .unwrap();

    service.reorder_items(vec![(a.id, 5), (b.id, 3)]).await.unwrap();

    let filter = ItemFilter {
        sort: SortKey::Priority,
        ..Default::default()
    };
    let page = service.list_items(filter).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![b.id, a.id]);
    assert_eq!(page.items[0].priority, 3);
    assert_eq!(page.items[1].priority, 5);
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn replays_an_item_from_its_audit_trail(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;
    let story = service
        .create_item(CreateItemBuilder::story().build())
        .await
        .unwrap();
    service
        .update_item(
            story.id,
            UpdateItem {
                status: Some(ItemStatus::Ready),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let latest = service
        .update_item(
            story.id,
            UpdateItem {
                status: Some(ItemStatus::InProgress),
                assignee: Some(Some("ana".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(service.replay_item(story.id).await.unwrap(), latest);

    let linked = service
        .set_external_id(story.id, "jira", "PAY-12")
        .await
        .unwrap();
    let replayed = service.replay_item(story.id).await.unwrap();
    assert_eq!(replayed.external_ids, linked.external_ids);
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn keeps_the_latest_external_id_per_system(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;
    let story = service
        .create_item(CreateItemBuilder::story().build())
        .await
        .unwrap();

    service.set_external_id(story.id, "jira", "PAY-1").await.unwrap();
    service.set_external_id(story.id, "github", "#42").await.unwrap();
    service.set_external_id(story.id, "jira", "PAY-2").await.unwrap();

    let item = service.get_item(story.id).await.unwrap();
    assert_eq!(item.external_ids.len(), 2);
    assert_eq!(item.external_ids["jira"], "PAY-2");
    assert_eq!(
        service
            .get_item_by_external_id("jira", "PAY-2")
            .await
            .unwrap()
            .id,
        story.id
    );
}

#[rstest]
#[case(Storage::Memory)]
#[case(Storage::Sqlite)]
#[tokio::test]
async fn scores_an_even_backlog_as_healthy(#[case] storage: Storage) {
    let backend = backend(storage).await;
    let service = &backend.service;
    for item_type in ItemType::ALL {
        for i in 0..10 {
            service
                .create_item(
                    CreateItemBuilder::new(item_type)
                        .title(format!("{item_type} {i}"))
                        .build(),
                )
                .await
                .unwrap();
        }
    }

    let snapshot = service.get_metrics().await.unwrap();

    assert_eq!(snapshot.total_items, 30);
    assert!((snapshot.iceberg_ratio - 1.0).abs() < 1e-9);
    assert_eq!(snapshot.health_status, HealthStatus::Healthy);
    assert_eq!(snapshot.wip_count, 0);
}

#[rstest]
#[tokio::test]
async fn flags_too_much_work_in_progress() {
    let backend = backend(Storage::Memory).await;
    let service = &backend.service;
    for i in 0..50 {
        let item = service
            .create_item(CreateItemBuilder::story().title(format!("s{i}")).build())
            .await
            .unwrap();
        if i < 25 {
            service
                .update_item(
                    item.id,
                    UpdateItem {
                        status: Some(ItemStatus::InProgress),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
    }

    let snapshot = service.get_metrics().await.unwrap();

    assert_eq!(snapshot.total_items, 50);
    assert_eq!(snapshot.wip_count, 25);
    assert_eq!(snapshot.health_status, HealthStatus::Warning);
}

#[rstest]
#[tokio::test]
async fn delivers_notifications_to_consumers() {
    let backend = backend(Storage::Memory).await;
    let TestBackend {
        service,
        reports,
        outbox,
        ..
    } = backend;
    let bus = Arc::new(InMemoryMessageBus::new());
    let mut relay = NotificationRelay::new(outbox, bus.clone(), reports.clone());

    let epic = service
        .create_item(CreateItemBuilder::epic().build())
        .await
        .unwrap();
    let feature = service
        .create_item(CreateItemBuilder::feature().parent(epic.id).build())
        .await
        .unwrap();
    service
        .reorder_items(vec![(epic.id, 1), (feature.id, 2)])
        .await
        .unwrap();
    service
        .set_external_id(feature.id, "jira", "PAY-9")
        .await
        .unwrap();
    service.delete_item(feature.id).await.unwrap();

    for _ in 0..5 {
        assert!(relay.relay_next().await);
    }
    assert_eq!(reports.stats().await.delivered, 5);

    let created = bus.messages("item.created").await;
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].key, epic.id.to_string());
    assert_eq!(created[0].event_type, "ITEM_CREATED");
    assert_eq!(created[0].payload["payload"]["kind"], "ITEM_CREATED");
    assert_eq!(bus.messages("items.reordered").await.len(), 1);
    assert_eq!(bus.messages("item.external_id.set").await.len(), 1);
    assert_eq!(
        bus.messages("item.deleted").await[0].key,
        feature.id.to_string()
    );

    let topics = EventKind::ALL
        .iter()
        .map(|kind| kind.topic().to_string())
        .collect();
    let mut consumer = EventConsumer::new(bus.clone(), "audit", topics, Arc::new(LoggingHandler));
    let outcome = consumer.poll_once().await.unwrap();
    assert_eq!(outcome.handled, 5);
    assert_eq!(outcome.failed, 0);
    assert_eq!(bus.committed("item.created", "audit").await.unwrap(), 2);
}
