// Composition root for the backlog service.
//
// Responsibilities:
// - Read config from environment.
// - Instantiate the storage adapters selected by config (memory or SQLite).
// - Wire the cache, publisher queue and metrics into the backlog service.
// - Hand the relay and bus to the background workers.

pub mod config;
pub mod http;
pub mod state;
pub mod workers;

use crate::modules::backlog::adapters::outbound::event_log::EventLog;
use crate::modules::backlog::adapters::outbound::event_log_in_memory::InMemoryEventLog;
use crate::modules::backlog::adapters::outbound::event_log_sqlite::SqliteEventLog;
use crate::modules::backlog::adapters::outbound::repository::{BacklogRepository, MetricsQueries};
use crate::modules::backlog::adapters::outbound::repository_in_memory::InMemoryBacklogRepository;
use crate::modules::backlog::adapters::outbound::repository_sqlite::SqliteBacklogRepository;
use crate::modules::backlog::application::cache_policy::CachePolicy;
use crate::modules::backlog::application::metrics_aggregator::MetricsAggregator;
use crate::modules::backlog::application::service::BacklogService;
use crate::shared::infrastructure::cache::CacheStore;
use crate::shared::infrastructure::cache::in_memory::InMemoryCacheStore;
use crate::shared::infrastructure::message_bus::MessageBus;
use crate::shared::infrastructure::message_bus::in_memory::InMemoryMessageBus;
use crate::shared::infrastructure::message_bus::relay::{
    DeliveryReports, NotificationRelay, QueuedPublisher,
};
use crate::shared::infrastructure::sqlite::{open_db, shared};
use config::{AppConfig, StorageKind};
use state::AppState;
use std::sync::Arc;

pub struct Backend {
    pub state: AppState,
    pub relay: NotificationRelay,
    pub bus: Arc<dyn MessageBus>,
    pub cache: Arc<dyn CacheStore>,
}

type Storage = (
    Arc<dyn BacklogRepository>,
    Arc<dyn MetricsQueries>,
    Arc<dyn EventLog>,
);

fn storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match config.storage {
        StorageKind::Memory => {
            let repository = Arc::new(InMemoryBacklogRepository::new());
            Ok((repository.clone(), repository, Arc::new(InMemoryEventLog::new())))
        }
        StorageKind::Sqlite => {
            let conn = shared(open_db(&config.database_path)?);
            let repository = Arc::new(SqliteBacklogRepository::new(conn.clone()));
            Ok((repository.clone(), repository, Arc::new(SqliteEventLog::new(conn))))
        }
    }
}

pub async fn compose(config: &AppConfig) -> anyhow::Result<Backend> {
    let (repository, metrics_queries, event_log) = storage(config)?;

    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new(config.cache_namespace.clone()));
    cache.open().await?;

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new());
    let reports = Arc::new(DeliveryReports::new());
    let (publisher, queue) = QueuedPublisher::channel(config.bus_queue_capacity);
    let relay = NotificationRelay::new(queue, bus.clone(), reports.clone());

    let service = BacklogService::new(
        repository,
        event_log,
        Arc::new(publisher),
        CachePolicy::new(cache.clone()),
        MetricsAggregator::new(metrics_queries, config.metrics_window_days)
            .with_ageing_threshold(config.ageing_threshold_days),
        config.request_timeout,
    );

    tracing::info!(
        storage = ?config.storage,
        timeout_ms = config.request_timeout.as_millis() as u64,
        "backlog service composed"
    );

    Ok(Backend {
        state: AppState {
            service: Arc::new(service),
            reports,
        },
        relay,
        bus,
        cache,
    })
}
