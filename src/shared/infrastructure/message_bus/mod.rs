// Message bus ports.
//
// Purpose
// - Carry domain notifications to other services, one topic per event kind.
//
// Responsibilities
// - `EventPublisher` is what the application sees: a non-blocking hand-off.
// - `MessageBus` is the transport: append-only topic logs with committed
//   offsets per consumer group.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub occurred_at: i64,
    pub payload: Json,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("publish queue is closed")]
    Closed,

    #[error("could not encode message: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("offset {offset} is past the end of topic {topic}")]
    OffsetOutOfRange { topic: String, offset: u64 },

    #[error("bus backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: BusMessage) -> Result<(), PublishError>;
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Appends to the message's topic and returns the assigned offset.
    async fn send(&self, message: BusMessage) -> Result<u64, BusError>;

    /// Message stored at `offset`, or `None` once the consumer is caught up.
    async fn fetch(&self, topic: &str, offset: u64) -> Result<Option<BusMessage>, BusError>;

    /// Next offset the group has not acknowledged yet (0 for a new group).
    async fn committed(&self, topic: &str, group: &str) -> Result<u64, BusError>;

    async fn commit(&self, topic: &str, group: &str, next_offset: u64) -> Result<(), BusError>;
}

pub mod consumer;
pub mod in_memory;
pub mod relay;
