// Backlog domain service.
//
// Purpose
// - Orchestrate the repository, audit log, publisher and cache behind the
//   backlog operations.
//
// Responsibilities
// - Validate, then persist. The repository write is the only step whose
//   failure fails the operation.
// - After a successful write: append the audit event, publish it, then
//   invalidate the cache. Failures there are logged and swallowed.
// - Reads go through the cache and repopulate it on a miss.
// - Every operation is bounded by the configured deadline.

use crate::modules::backlog::adapters::outbound::event_log::EventLog;
use crate::modules::backlog::adapters::outbound::notifications::publish_event;
use crate::modules::backlog::adapters::outbound::repository::BacklogRepository;
use crate::modules::backlog::application::cache_policy::{CachePolicy, Invalidation};
use crate::modules::backlog::application::commands::{CreateItem, ItemPage, UpdateItem};
use crate::modules::backlog::application::errors::BacklogError;
use crate::modules::backlog::application::metrics_aggregator::MetricsAggregator;
use crate::modules::backlog::core::events::DomainEvent;
use crate::modules::backlog::core::evolve::replay;
use crate::modules::backlog::core::filter::ItemFilter;
use crate::modules::backlog::core::item::{BacklogItem, ItemValidationError};
use crate::modules::backlog::core::metrics::MetricsSnapshot;
use crate::shared::core::primitives::now_millis;
use crate::shared::infrastructure::message_bus::EventPublisher;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct BacklogService {
    repository: Arc<dyn BacklogRepository>,
    event_log: Arc<dyn EventLog>,
    publisher: Arc<dyn EventPublisher>,
    cache: CachePolicy,
    metrics: MetricsAggregator,
    timeout: Duration,
}

impl BacklogService {
    pub fn new(
        repository: Arc<dyn BacklogRepository>,
        event_log: Arc<dyn EventLog>,
        publisher: Arc<dyn EventPublisher>,
        cache: CachePolicy,
        metrics: MetricsAggregator,
        timeout: Duration,
    ) -> Self {
        Self {
            repository,
            event_log,
            publisher,
            cache,
            metrics,
            timeout,
        }
    }

    pub async fn create_item(&self, command: CreateItem) -> Result<BacklogItem, BacklogError> {
        let item = self
            .bounded("create_item", async {
                let now = now_millis();
                let mut item =
                    BacklogItem::new(command.item_type, command.title, command.description, now)?;
                if let Some(parent_id) = command.parent_id {
                    let parent = self.load(parent_id).await?;
                    ensure_parent_accepts(&parent, &item)?;
                    item.set_parent(Some(parent_id))?;
                }
                item.set_story_points(command.story_points)?;
                item.replace_tags(command.tags);
                item.assignee = command.assignee.filter(|a| !a.trim().is_empty());

                self.repository.create(&item).await?;
                Ok(item)
            })
            .await?;

        tracing::info!(item_id = %item.id, item_type = %item.item_type, "backlog item created");
        self.after_write(
            DomainEvent::item_created(&item, item.created_at),
            Invalidation::ItemChanged {
                before: None,
                after: Some(item.clone()),
            },
        )
        .await;
        Ok(item)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<BacklogItem, BacklogError> {
        self.bounded("get_item", async {
            if let Some(item) = self.cache.item(id).await {
                return Ok(item);
            }
            let item = self.load(id).await?;
            self.cache.store_item(&item).await;
            Ok(item)
        })
        .await
    }

    pub async fn get_item_by_external_id(
        &self,
        system: &str,
        external_id: &str,
    ) -> Result<BacklogItem, BacklogError> {
        self.bounded("get_item_by_external_id", async {
            self.repository
                .get_by_external_id(system, external_id)
                .await?
                .ok_or_else(|| BacklogError::ExternalIdNotFound {
                    system: system.to_string(),
                    external_id: external_id.to_string(),
                })
        })
        .await
    }

    pub async fn update_item(
        &self,
        id: Uuid,
        patch: UpdateItem,
    ) -> Result<BacklogItem, BacklogError> {
        let (before, after) = self
            .bounded("update_item", async {
                let before = self.load(id).await?;
                if patch.is_empty() {
                    return Ok((before.clone(), before));
                }
                let mut item = before.clone();

                if let Some(title) = patch.title {
                    item.rename(title)?;
                }
                if let Some(description) = patch.description {
                    item.description = description;
                }
                if let Some(status) = patch.status {
                    item.status = status;
                }
                if let Some(points) = patch.story_points {
                    item.set_story_points(points)?;
                }
                if let Some(priority) = patch.priority {
                    item.priority = priority;
                }
                if let Some(assignee) = patch.assignee {
                    item.assignee = assignee.filter(|a| !a.trim().is_empty());
                }
                if let Some(tags) = patch.tags {
                    item.replace_tags(tags);
                }
                if let Some(parent_id) = patch.parent_id {
                    if parent_id != item.parent_id {
                        if let Some(parent_id) = parent_id {
                            let parent = self.load(parent_id).await?;
                            ensure_parent_accepts(&parent, &item)?;
                        }
                        item.set_parent(parent_id)?;
                    }
                }

                item.touch(now_millis());
                self.repository.update(&item).await?;
                Ok((before, item))
            })
            .await?;

        if before == after {
            return Ok(after);
        }
        tracing::info!(item_id = %id, "backlog item updated");
        self.after_write(
            DomainEvent::item_updated(&after, after.updated_at),
            Invalidation::ItemChanged {
                before: Some(before),
                after: Some(after.clone()),
            },
        )
        .await;
        Ok(after)
    }

    pub async fn delete_item(&self, id: Uuid) -> Result<(), BacklogError> {
        let item = self
            .bounded("delete_item", async {
                let item = self.load(id).await?;
                if self.repository.has_children(id).await? {
                    return Err(BacklogError::HasChildren(id));
                }
                self.repository.delete(id).await?;
                Ok(item)
            })
            .await?;

        tracing::info!(item_id = %id, "backlog item deleted");
        self.after_write(
            DomainEvent::item_deleted(&item, now_millis()),
            Invalidation::ItemChanged {
                before: Some(item),
                after: None,
            },
        )
        .await;
        Ok(())
    }

    pub async fn list_items(&self, filter: ItemFilter) -> Result<ItemPage, BacklogError> {
        let filter = filter.normalized();
        self.bounded("list_items", async {
            if let Some(page) = self.cache.list(&filter).await {
                return Ok(page);
            }
            let (items, total) = self.repository.list(&filter).await?;
            let page = ItemPage { items, total };
            self.cache.store_list(&filter, &page).await;
            Ok(page)
        })
        .await
    }

    pub async fn get_children(&self, parent_id: Uuid) -> Result<Vec<BacklogItem>, BacklogError> {
        self.bounded("get_children", async {
            if let Some(children) = self.cache.children(parent_id).await {
                return Ok(children);
            }
            let children = self.repository.children(parent_id).await?;
            self.cache.store_children(parent_id, &children).await;
            Ok(children)
        })
        .await
    }

    /// Applies every priority or none. Later entries for the same id win.
    pub async fn reorder_items(&self, priorities: Vec<(Uuid, i32)>) -> Result<(), BacklogError> {
        let batch: BTreeMap<Uuid, i32> = priorities.into_iter().collect();
        if batch.is_empty() {
            return Ok(());
        }
        let now = now_millis();
        self.bounded("reorder_items", async {
            self.repository.update_priorities(&batch, now).await?;
            Ok(())
        })
        .await?;

        tracing::info!(count = batch.len(), "backlog items reordered");
        let moved = batch.keys().copied().collect();
        self.after_write(
            DomainEvent::items_reordered(batch, now),
            Invalidation::Reordered(moved),
        )
        .await;
        Ok(())
    }

    pub async fn set_external_id(
        &self,
        id: Uuid,
        system: &str,
        external_id: &str,
    ) -> Result<BacklogItem, BacklogError> {
        let (system, external_id) = (system.trim(), external_id.trim());
        if system.is_empty() || external_id.is_empty() {
            return Err(ItemValidationError::EmptyExternalReference.into());
        }
        let item = self
            .bounded("set_external_id", async {
                let mut item = self.load(id).await?;
                item.set_external_id(system, external_id);
                item.touch(now_millis());
                self.repository.update(&item).await?;
                Ok(item)
            })
            .await?;

        tracing::info!(item_id = %id, system, "external id set");
        self.after_write(
            DomainEvent::external_id_set(id, system, external_id, item.updated_at),
            Invalidation::ExternalIdSet(id),
        )
        .await;
        Ok(item)
    }

    pub async fn get_metrics(&self) -> Result<MetricsSnapshot, BacklogError> {
        self.bounded("get_metrics", async {
            if let Some(snapshot) = self.cache.metrics().await {
                return Ok(snapshot);
            }
            let snapshot = self.metrics.compute(now_millis()).await?;
            self.cache.store_metrics(&snapshot).await;
            Ok(snapshot)
        })
        .await
    }

    /// Rebuilds an item from its audit events alone.
    pub async fn replay_item(&self, id: Uuid) -> Result<BacklogItem, BacklogError> {
        self.bounded("replay_item", async {
            let events = self.event_log.events_for_item(id).await?;
            replay(&events).ok_or(BacklogError::NotFound(id))
        })
        .await
    }

    async fn load(&self, id: Uuid) -> Result<BacklogItem, BacklogError> {
        self.repository
            .get(id)
            .await?
            .ok_or(BacklogError::NotFound(id))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, BacklogError>>,
    ) -> Result<T, BacklogError> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(operation, timeout_ms, "deadline exceeded");
                Err(BacklogError::DeadlineExceeded {
                    operation,
                    timeout_ms,
                })
            }
        }
    }

    /// Best-effort steps that follow a successful write.
    async fn after_write(&self, event: DomainEvent, invalidation: Invalidation) {
        let kind = event.kind();
        let steps = async {
            if let Err(e) = self.event_log.store_event(&event).await {
                tracing::error!(
                    event_id = %event.id,
                    item_id = ?event.item_id,
                    %kind,
                    error = %e,
                    "failed to store audit event"
                );
            }
            if let Err(e) = publish_event(self.publisher.as_ref(), &event).await {
                tracing::error!(
                    event_id = %event.id,
                    topic = kind.topic(),
                    error = %e,
                    "failed to publish event"
                );
            }
            self.cache.invalidate(invalidation).await;
        };
        if tokio::time::timeout(self.timeout, steps).await.is_err() {
            tracing::warn!(
                event_id = %event.id,
                %kind,
                "post-write steps exceeded the deadline"
            );
        }
    }
}

fn ensure_parent_accepts(parent: &BacklogItem, child: &BacklogItem) -> Result<(), BacklogError> {
    if parent.item_type.accepts_child(child.item_type) {
        Ok(())
    } else {
        Err(BacklogError::InvalidRelationship {
            parent: parent.item_type,
            child: child.item_type,
        })
    }
}
