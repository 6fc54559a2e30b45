// In memory implementation of the BacklogRepository and MetricsQueries ports.
//
// Purpose
// - Support service and HTTP tests, and local runs without a database.
//
// Responsibilities
// - Mirror the SQLite adapter: parent references are cleared when the parent
//   row goes, and priority batches are validated before any write.

use crate::modules::backlog::adapters::outbound::repository::{
    BacklogRepository, MetricsQueries, RepositoryError,
};
use crate::modules::backlog::core::filter::{
    ItemFilter, SortDirection, SortKey, apply_filter, sort_items,
};
use crate::modules::backlog::core::item::{BacklogItem, ItemStatus, ItemType};
use crate::shared::core::primitives::{days_ago, days_between};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryBacklogRepository {
    items: RwLock<HashMap<Uuid, BacklogItem>>,
    is_offline: bool,
}

impl InMemoryBacklogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&mut self) {
        self.is_offline = !self.is_offline;
    }

    fn check_online(&self) -> Result<(), RepositoryError> {
        if self.is_offline {
            return Err(RepositoryError::Backend("Backlog repository offline".into()));
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<BacklogItem>, RepositoryError> {
        self.check_online()?;
        Ok(self.items.read().await.values().cloned().collect())
    }
}

#[async_trait::async_trait]
impl BacklogRepository for InMemoryBacklogRepository {
    async fn create(&self, item: &BacklogItem) -> Result<(), RepositoryError> {
        self.check_online()?;
        let mut guard = self.items.write().await;
        if guard.contains_key(&item.id) {
            return Err(RepositoryError::Duplicate(item.id));
        }
        guard.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BacklogItem>, RepositoryError> {
        self.check_online()?;
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn get_by_external_id(
        &self,
        system: &str,
        external_id: &str,
    ) -> Result<Option<BacklogItem>, RepositoryError> {
        self.check_online()?;
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.external_ids.get(system).map(String::as_str) == Some(external_id))
            .min_by_key(|item| (item.created_at, item.id))
            .cloned())
    }

    async fn update(&self, item: &BacklogItem) -> Result<(), RepositoryError> {
        self.check_online()?;
        let mut guard = self.items.write().await;
        match guard.get_mut(&item.id) {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(item.id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.check_online()?;
        let mut guard = self.items.write().await;
        if guard.remove(&id).is_none() {
            return Err(RepositoryError::NotFound(id));
        }
        for child in guard.values_mut().filter(|i| i.parent_id == Some(id)) {
            child.parent_id = None;
        }
        Ok(())
    }

    async fn list(&self, filter: &ItemFilter) -> Result<(Vec<BacklogItem>, usize), RepositoryError> {
        let items = self.snapshot().await?;
        Ok(apply_filter(items, filter))
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<BacklogItem>, RepositoryError> {
        let mut children: Vec<BacklogItem> = self
            .snapshot()
            .await?
            .into_iter()
            .filter(|i| i.parent_id == Some(parent_id))
            .collect();
        sort_items(&mut children, SortKey::Priority, SortDirection::Asc);
        Ok(children)
    }

    async fn has_children(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.check_online()?;
        Ok(self
            .items
            .read()
            .await
            .values()
            .any(|i| i.parent_id == Some(id)))
    }

    async fn update_priorities(
        &self,
        priorities: &BTreeMap<Uuid, i32>,
        now_ms: i64,
    ) -> Result<(), RepositoryError> {
        self.check_online()?;
        let mut guard = self.items.write().await;
        if let Some(missing) = priorities.keys().find(|id| !guard.contains_key(id)) {
            return Err(RepositoryError::NotFound(*missing));
        }
        for (id, priority) in priorities {
            if let Some(item) = guard.get_mut(id) {
                item.priority = *priority;
                item.updated_at = item.updated_at.max(now_ms);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricsQueries for InMemoryBacklogRepository {
    async fn backlog_size(&self) -> Result<HashMap<ItemType, usize>, RepositoryError> {
        let mut sizes = HashMap::new();
        for item in self.snapshot().await? {
            if item.status != ItemStatus::Done {
                *sizes.entry(item.item_type).or_insert(0) += 1;
            }
        }
        Ok(sizes)
    }

    async fn average_age_by_type(
        &self,
        status: ItemStatus,
        now_ms: i64,
    ) -> Result<HashMap<ItemType, f64>, RepositoryError> {
        let mut sums: HashMap<ItemType, (f64, usize)> = HashMap::new();
        for item in self.snapshot().await? {
            if item.status == status {
                let entry = sums.entry(item.item_type).or_insert((0.0, 0));
                entry.0 += days_between(item.created_at, now_ms);
                entry.1 += 1;
            }
        }
        Ok(sums
            .into_iter()
            .map(|(item_type, (sum, count))| (item_type, sum / count as f64))
            .collect())
    }

    async fn wip_count(&self) -> Result<usize, RepositoryError> {
        Ok(self
            .snapshot()
            .await?
            .iter()
            .filter(|i| i.status == ItemStatus::InProgress)
            .count())
    }

    async fn lead_time_days(&self, window_days: u32, now_ms: i64) -> Result<f64, RepositoryError> {
        let since = days_ago(now_ms, window_days);
        let lead_times: Vec<f64> = self
            .snapshot()
            .await?
            .iter()
            .filter(|i| i.status == ItemStatus::Done && i.updated_at >= since)
            .map(|i| days_between(i.created_at, i.updated_at))
            .collect();
        if lead_times.is_empty() {
            return Ok(0.0);
        }
        Ok(lead_times.iter().sum::<f64>() / lead_times.len() as f64)
    }

    async fn throughput(&self, window_days: u32, now_ms: i64) -> Result<usize, RepositoryError> {
        let since = days_ago(now_ms, window_days);
        Ok(self
            .snapshot()
            .await?
            .iter()
            .filter(|i| i.status == ItemStatus::Done && i.updated_at >= since)
            .count())
    }

    async fn blocked_items(&self, now_ms: i64) -> Result<(usize, f64), RepositoryError> {
        let blocked_days: Vec<f64> = self
            .snapshot()
            .await?
            .iter()
            .filter(|i| i.status == ItemStatus::Blocked)
            .map(|i| days_between(i.updated_at, now_ms))
            .collect();
        if blocked_days.is_empty() {
            return Ok((0, 0.0));
        }
        let mean = blocked_days.iter().sum::<f64>() / blocked_days.len() as f64;
        Ok((blocked_days.len(), mean))
    }

    async fn ageing_items(
        &self,
        threshold_days: u32,
        now_ms: i64,
    ) -> Result<usize, RepositoryError> {
        let cutoff = days_ago(now_ms, threshold_days);
        Ok(self
            .snapshot()
            .await?
            .iter()
            .filter(|i| i.status != ItemStatus::Done && i.created_at < cutoff)
            .count())
    }

    async fn story_points_in_window(
        &self,
        window_days: u32,
        now_ms: i64,
    ) -> Result<(i64, i64), RepositoryError> {
        let since = days_ago(now_ms, window_days);
        let (mut completed, mut total) = (0_i64, 0_i64);
        for item in self.snapshot().await? {
            let points = i64::from(item.story_points);
            if item.status == ItemStatus::Done && item.updated_at >= since {
                completed += points;
            }
            if item.created_at >= since {
                total += points;
            }
        }
        Ok((completed, total))
    }

    async fn type_counts(&self) -> Result<HashMap<ItemType, usize>, RepositoryError> {
        let mut counts = HashMap::new();
        for item in self.snapshot().await? {
            *counts.entry(item.item_type).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
