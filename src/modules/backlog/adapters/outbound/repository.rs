// Persistence ports for backlog items.
//
// `BacklogRepository` is the system of record. `MetricsQueries` are the
// read-only aggregate queries the metrics aggregator runs against it.

use crate::modules::backlog::core::filter::ItemFilter;
use crate::modules::backlog::core::item::{BacklogItem, ItemStatus, ItemType};
use crate::shared::infrastructure::sqlite::DbError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("backlog item not found: {0}")]
    NotFound(Uuid),

    #[error("backlog item already exists: {0}")]
    Duplicate(Uuid),

    #[error("invalid persisted item data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

#[async_trait]
pub trait BacklogRepository: Send + Sync {
    async fn create(&self, item: &BacklogItem) -> Result<(), RepositoryError>;
    async fn get(&self, id: Uuid) -> Result<Option<BacklogItem>, RepositoryError>;
    async fn get_by_external_id(
        &self,
        system: &str,
        external_id: &str,
    ) -> Result<Option<BacklogItem>, RepositoryError>;
    async fn update(&self, item: &BacklogItem) -> Result<(), RepositoryError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Page of matching items plus the total number of matches.
    async fn list(&self, filter: &ItemFilter) -> Result<(Vec<BacklogItem>, usize), RepositoryError>;

    /// Direct children, priority ascending.
    async fn children(&self, parent_id: Uuid) -> Result<Vec<BacklogItem>, RepositoryError>;
    async fn has_children(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// All-or-nothing: an unknown id fails with `NotFound` and no priority
    /// changes.
    async fn update_priorities(
        &self,
        priorities: &BTreeMap<Uuid, i32>,
        now_ms: i64,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MetricsQueries: Send + Sync {
    /// Non-DONE items per type. Types with no items are absent.
    async fn backlog_size(&self) -> Result<HashMap<ItemType, usize>, RepositoryError>;

    /// Mean age in days of items in `status`, per type.
    async fn average_age_by_type(
        &self,
        status: ItemStatus,
        now_ms: i64,
    ) -> Result<HashMap<ItemType, f64>, RepositoryError>;

    async fn wip_count(&self) -> Result<usize, RepositoryError>;

    /// Mean created-to-done days of DONE items updated within the window.
    async fn lead_time_days(&self, window_days: u32, now_ms: i64) -> Result<f64, RepositoryError>;

    async fn throughput(&self, window_days: u32, now_ms: i64) -> Result<usize, RepositoryError>;

    /// BLOCKED item count and their mean days since last update (0.0 when
    /// none are blocked).
    async fn blocked_items(&self, now_ms: i64) -> Result<(usize, f64), RepositoryError>;

    /// Non-DONE items created more than `threshold_days` ago.
    async fn ageing_items(&self, threshold_days: u32, now_ms: i64)
    -> Result<usize, RepositoryError>;

    /// Story points of DONE items updated within the window, and story
    /// points of every item created within it.
    async fn story_points_in_window(
        &self,
        window_days: u32,
        now_ms: i64,
    ) -> Result<(i64, i64), RepositoryError>;

    /// Every stored item per type, DONE included. Types with no items are
    /// absent.
    async fn type_counts(&self) -> Result<HashMap<ItemType, usize>, RepositoryError>;
}
