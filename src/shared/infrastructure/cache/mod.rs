// Cache port.
//
// Purpose
// - Hold derived, TTL-bounded copies of read results. Never authoritative.
//
// Responsibilities
// - Explicit lifecycle: a store must be opened before use and fails with
//   `CacheError::Closed` after `close`.
// - Namespace every key so several services can share one cache.

use async_trait::async_trait;
use serde_json::Value as Json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache is closed")]
    Closed,

    #[error("cache serialisation failed: {0}")]
    Serialization(String),

    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn open(&self) -> Result<(), CacheError>;
    async fn close(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Json>, CacheError>;
    async fn set(&self, key: &str, value: Json, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes every key starting with `prefix`; returns how many went.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Live keys starting with `prefix`, without the namespace.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

pub mod in_memory;
