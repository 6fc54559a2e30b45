use crate::modules::backlog::core::item::{BacklogItem, ItemStatus, ItemType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub item_type: ItemType,
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub story_points: i32,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
}

/// Partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateItem {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ItemStatus>,
    pub parent_id: Option<Option<Uuid>>,
    pub story_points: Option<i32>,
    pub priority: Option<i32>,
    pub assignee: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl UpdateItem {
    pub fn is_empty(&self) -> bool {
        self == &UpdateItem::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<BacklogItem>,
    pub total: usize,
}
