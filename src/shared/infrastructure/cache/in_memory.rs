// In memory implementation of the CacheStore port.
//
// Expired entries are dropped lazily, when a read or key scan touches them.

use crate::shared::infrastructure::cache::{CacheError, CacheStore};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: Json,
    expires_at: Instant,
}

pub struct InMemoryCacheStore {
    namespace: String,
    entries: RwLock<HashMap<String, Entry>>,
    open: AtomicBool,
    is_offline: bool,
}

impl InMemoryCacheStore {
    /// Creates a closed store; call `open` before use.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: RwLock::new(HashMap::new()),
            open: AtomicBool::new(false),
            is_offline: false,
        }
    }

    pub fn toggle_offline(&mut self) {
        self.is_offline = !self.is_offline;
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn ensure_usable(&self) -> Result<(), CacheError> {
        if self.is_offline {
            return Err(CacheError::Backend("Cache offline".into()));
        }
        if !self.open.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn open(&self) -> Result<(), CacheError> {
        if self.is_offline {
            return Err(CacheError::Backend("Cache offline".into()));
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.open.store(false, Ordering::Release);
        self.entries.write().await.clear();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Json>, CacheError> {
        self.ensure_usable()?;
        let key = self.namespaced(key);
        let now = Instant::now();
        {
            let guard = self.entries.read().await;
            match guard.get(&key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        let mut guard = self.entries.write().await;
        if guard.get(&key).is_some_and(|e| e.expires_at <= now) {
            guard.remove(&key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Json, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_usable()?;
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .await
            .insert(self.namespaced(key), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.ensure_usable()?;
        self.entries.write().await.remove(&self.namespaced(key));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        self.ensure_usable()?;
        let prefix = self.namespaced(prefix);
        let mut guard = self.entries.write().await;
        let before = guard.len();
        guard.retain(|key, _| !key.starts_with(&prefix));
        Ok(before - guard.len())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.ensure_usable()?;
        let full_prefix = self.namespaced(prefix);
        let now = Instant::now();
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.expires_at > now);
        let mut keys: Vec<String> = guard
            .keys()
            .filter(|k| k.starts_with(&full_prefix))
            .filter_map(|k| k.strip_prefix(&self.namespace).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
