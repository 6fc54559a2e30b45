use crate::modules::backlog::core::events::{DomainEvent, EventDecodeError};
use crate::shared::infrastructure::sqlite::DbError;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event {0} already stored")]
    Duplicate(Uuid),

    #[error(transparent)]
    Decode(#[from] EventDecodeError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for EventLogError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Append-only audit log. Events come back oldest first.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn store_event(&self, event: &DomainEvent) -> Result<(), EventLogError>;
    async fn events_for_item(&self, item_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError>;
    async fn all_events(&self) -> Result<Vec<DomainEvent>, EventLogError>;
}
