// Read-through cache policy for the backlog service.
//
// Purpose
// - Decide what is cached under which key and TTL, and which keys a write
//   makes stale.
//
// Responsibilities
// - Every cache failure is logged and swallowed; the caller falls back to
//   the repository.
// - List entries remember the filter they were built from. A write only
//   drops the lists whose filter matches the item before or after it.

use crate::modules::backlog::application::commands::ItemPage;
use crate::modules::backlog::core::cache_keys::{
    CHILDREN_PREFIX, CHILDREN_TTL, ITEM_TTL, LIST_PREFIX, LIST_TTL, METRICS_KEY, METRICS_TTL,
    children_key, item_key, list_key,
};
use crate::modules::backlog::core::filter::ItemFilter;
use crate::modules::backlog::core::item::BacklogItem;
use crate::modules::backlog::core::metrics::MetricsSnapshot;
use crate::shared::infrastructure::cache::CacheStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedList {
    filter: ItemFilter,
    page: ItemPage,
}

/// What a successful write changed, from the cache's point of view.
#[derive(Debug, Clone)]
pub enum Invalidation {
    ItemChanged {
        before: Option<BacklogItem>,
        after: Option<BacklogItem>,
    },
    /// Ids whose priority the batch rewrote.
    Reordered(Vec<Uuid>),
    ExternalIdSet(Uuid),
}

#[derive(Clone)]
pub struct CachePolicy {
    cache: Arc<dyn CacheStore>,
}

impl CachePolicy {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    pub async fn item(&self, id: Uuid) -> Option<BacklogItem> {
        self.read(&item_key(id)).await
    }

    pub async fn store_item(&self, item: &BacklogItem) {
        self.write(&item_key(item.id), item, ITEM_TTL).await;
    }

    pub async fn children(&self, parent_id: Uuid) -> Option<Vec<BacklogItem>> {
        self.read(&children_key(parent_id)).await
    }

    pub async fn store_children(&self, parent_id: Uuid, children: &[BacklogItem]) {
        self.write(&children_key(parent_id), children, CHILDREN_TTL)
            .await;
    }

    pub async fn list(&self, filter: &ItemFilter) -> Option<ItemPage> {
        if !filter.is_cacheable() {
            return None;
        }
        let key = list_key(filter);
        let cached: CachedList = self.read(&key).await?;
        if cached.filter != *filter {
            tracing::debug!(key, "list fingerprint collision, treating as a miss");
            return None;
        }
        Some(cached.page)
    }

    pub async fn store_list(&self, filter: &ItemFilter, page: &ItemPage) {
        if !filter.is_cacheable() {
            return;
        }
        let entry = CachedList {
            filter: filter.clone(),
            page: page.clone(),
        };
        self.write(&list_key(filter), &entry, LIST_TTL).await;
    }

    pub async fn metrics(&self) -> Option<MetricsSnapshot> {
        self.read(METRICS_KEY).await
    }

    pub async fn store_metrics(&self, snapshot: &MetricsSnapshot) {
        self.write(METRICS_KEY, snapshot, METRICS_TTL).await;
    }

    pub async fn invalidate(&self, invalidation: Invalidation) {
        match invalidation {
            Invalidation::ItemChanged { before, after } => {
                let mut keys = vec![METRICS_KEY.to_string()];
                for item in before.iter().chain(after.iter()) {
                    keys.push(item_key(item.id));
                    keys.push(children_key(item.id));
                    if let Some(parent_id) = item.parent_id {
                        keys.push(children_key(parent_id));
                    }
                }
                keys.sort();
                keys.dedup();
                for key in &keys {
                    self.delete(key).await;
                }
                self.drop_matching_lists(before.as_ref(), after.as_ref())
                    .await;
            }
            Invalidation::Reordered(ids) => {
                for id in ids {
                    self.delete(&item_key(id)).await;
                }
                self.delete(METRICS_KEY).await;
                self.delete_prefix(LIST_PREFIX).await;
                self.delete_prefix(CHILDREN_PREFIX).await;
            }
            Invalidation::ExternalIdSet(id) => {
                self.delete(&item_key(id)).await;
            }
        }
    }

    async fn drop_matching_lists(&self, before: Option<&BacklogItem>, after: Option<&BacklogItem>) {
        let keys = match self.cache.keys(LIST_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cache key scan failed, dropping every list");
                self.delete_prefix(LIST_PREFIX).await;
                return;
            }
        };
        for key in keys {
            let affected = match self.read::<CachedList>(&key).await {
                Some(cached) => [before, after]
                    .into_iter()
                    .flatten()
                    .any(|item| cached.filter.matches(item)),
                None => true,
            };
            if affected {
                self.delete(&key).await;
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.cache.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(decoded) => {
                tracing::debug!(key, "cache hit");
                Some(decoded)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "could not encode cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, value, ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            tracing::warn!(key, error = %e, "cache invalidation failed");
        }
    }

    async fn delete_prefix(&self, prefix: &str) {
        if let Err(e) = self.cache.delete_prefix(prefix).await {
            tracing::warn!(prefix, error = %e, "cache invalidation failed");
        }
    }
}
