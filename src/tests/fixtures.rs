// Shared builders and wiring for the crate's tests.

use crate::modules::backlog::adapters::outbound::event_log::EventLog;
use crate::modules::backlog::adapters::outbound::event_log_in_memory::InMemoryEventLog;
use crate::modules::backlog::adapters::outbound::event_log_sqlite::SqliteEventLog;
use crate::modules::backlog::adapters::outbound::repository::{BacklogRepository, MetricsQueries};
use crate::modules::backlog::adapters::outbound::repository_in_memory::InMemoryBacklogRepository;
use crate::modules::backlog::adapters::outbound::repository_sqlite::SqliteBacklogRepository;
use crate::modules::backlog::application::cache_policy::CachePolicy;
use crate::modules::backlog::application::commands::CreateItem;
use crate::modules::backlog::application::metrics_aggregator::MetricsAggregator;
use crate::modules::backlog::application::service::BacklogService;
use crate::modules::backlog::core::item::ItemType;
use crate::shared::infrastructure::cache::CacheStore;
use crate::shared::infrastructure::cache::in_memory::InMemoryCacheStore;
use crate::shared::infrastructure::message_bus::BusMessage;
use crate::shared::infrastructure::message_bus::relay::{DeliveryReports, QueuedPublisher};
use crate::shared::infrastructure::sqlite::{open_db_in_memory, shared};
use crate::shell::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct CreateItemBuilder {
    inner: CreateItem,
}

impl CreateItemBuilder {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            inner: CreateItem {
                item_type,
                title: format!("{} fixture", item_type.as_str().to_lowercase()),
                description: None,
                parent_id: None,
                story_points: 0,
                tags: vec![],
                assignee: None,
            },
        }
    }

    pub fn epic() -> Self {
        Self::new(ItemType::Epic)
    }

    pub fn feature() -> Self {
        Self::new(ItemType::Feature)
    }

    pub fn story() -> Self {
        Self::new(ItemType::Story)
    }

    pub fn title(mut self, v: impl Into<String>) -> Self {
        self.inner.title = v.into();
        self
    }

    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.inner.description = Some(v.into());
        self
    }

    pub fn parent(mut self, v: Uuid) -> Self {
        self.inner.parent_id = Some(v);
        self
    }

    pub fn story_points(mut self, v: i32) -> Self {
        self.inner.story_points = v;
        self
    }

    pub fn tags(mut self, v: &[&str]) -> Self {
        self.inner.tags = v.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn assignee(mut self, v: impl Into<String>) -> Self {
        self.inner.assignee = Some(v.into());
        self
    }

    pub fn build(self) -> CreateItem {
        self.inner
    }
}

/// A fully wired service. `outbox` receives every published notification;
/// hand it to a `NotificationRelay` to exercise the bus.
pub struct TestBackend {
    pub service: Arc<BacklogService>,
    pub repository: Arc<dyn BacklogRepository>,
    pub event_log: Arc<dyn EventLog>,
    pub cache: Arc<InMemoryCacheStore>,
    pub reports: Arc<DeliveryReports>,
    pub outbox: mpsc::Receiver<BusMessage>,
}

impl TestBackend {
    pub async fn in_memory(timeout: Duration) -> Self {
        let repository = Arc::new(InMemoryBacklogRepository::new());
        Self::wire(repository.clone(), repository, Arc::new(InMemoryEventLog::new()), timeout).await
    }

    pub async fn with_offline_repository(timeout: Duration) -> Self {
        let mut repository = InMemoryBacklogRepository::new();
        repository.toggle_offline();
        let repository = Arc::new(repository);
        Self::wire(repository.clone(), repository, Arc::new(InMemoryEventLog::new()), timeout).await
    }

    pub async fn sqlite(timeout: Duration) -> Self {
        let conn = shared(open_db_in_memory().unwrap());
        let repository = Arc::new(SqliteBacklogRepository::new(conn.clone()));
        Self::wire(
            repository.clone(),
            repository,
            Arc::new(SqliteEventLog::new(conn)),
            timeout,
        )
        .await
    }

    async fn wire(
        repository: Arc<dyn BacklogRepository>,
        metrics: Arc<dyn MetricsQueries>,
        event_log: Arc<dyn EventLog>,
        timeout: Duration,
    ) -> Self {
        let cache = Arc::new(InMemoryCacheStore::new("test:"));
        cache.open().await.unwrap();
        let (publisher, outbox) = QueuedPublisher::channel(256);
        let service = BacklogService::new(
            repository.clone(),
            event_log.clone(),
            Arc::new(publisher),
            CachePolicy::new(cache.clone()),
            MetricsAggregator::new(metrics, 30),
            timeout,
        );
        Self {
            service: Arc::new(service),
            repository,
            event_log,
            cache,
            reports: Arc::new(DeliveryReports::new()),
            outbox,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            service: self.service.clone(),
            reports: self.reports.clone(),
        }
    }
}
