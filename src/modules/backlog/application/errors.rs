use crate::modules::backlog::adapters::outbound::event_log::EventLogError;
use crate::modules::backlog::adapters::outbound::repository::RepositoryError;
use crate::modules::backlog::core::item::{ItemType, ItemValidationError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error(transparent)]
    Repository(RepositoryError),

    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error(transparent)]
    Validation(#[from] ItemValidationError),

    #[error("backlog item not found: {0}")]
    NotFound(Uuid),

    #[error("no backlog item linked to {system} id {external_id}")]
    ExternalIdNotFound { system: String, external_id: String },

    #[error("a {parent} cannot be the parent of a {child}")]
    InvalidRelationship { parent: ItemType, child: ItemType },

    #[error("backlog item {0} still has children")]
    HasChildren(Uuid),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("{operation} exceeded its deadline of {timeout_ms} ms")]
    DeadlineExceeded {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl From<RepositoryError> for BacklogError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            other => Self::Infrastructure(InfrastructureError::Repository(other)),
        }
    }
}

impl From<EventLogError> for BacklogError {
    fn from(value: EventLogError) -> Self {
        Self::Infrastructure(InfrastructureError::EventLog(value))
    }
}
