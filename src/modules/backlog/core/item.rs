// BacklogItem aggregate.
//
// Invariants
// - title is non-empty after trimming.
// - story_points >= 0.
// - Type chain is Epic -> Feature -> Story; an epic never has a parent.
//
// The aggregate does not know about other items. Checking the parent's type
// needs a lookup, so that half of the chain rule lives in the service and
// uses `ItemType::accepts_child`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("story points must be non-negative, got {0}")]
    NegativeStoryPoints(i32),

    #[error("an epic cannot have a parent")]
    EpicWithParent,

    #[error("an item cannot be its own parent")]
    SelfParent,

    #[error("external system and external id must not be empty")]
    EmptyExternalReference,

    #[error("unknown item type: {0}")]
    UnknownType(String),

    #[error("unknown item status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Epic,
    Feature,
    Story,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::Epic, ItemType::Feature, ItemType::Story];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Epic => "EPIC",
            ItemType::Feature => "FEATURE",
            ItemType::Story => "STORY",
        }
    }

    /// Whether an item of this type may be the direct parent of `child`.
    pub fn accepts_child(&self, child: ItemType) -> bool {
        matches!(
            (self, child),
            (ItemType::Epic, ItemType::Feature) | (ItemType::Feature, ItemType::Story)
        )
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ItemValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EPIC" => Ok(ItemType::Epic),
            "FEATURE" => Ok(ItemType::Feature),
            "STORY" => Ok(ItemType::Story),
            _ => Err(ItemValidationError::UnknownType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    New,
    Ready,
    InProgress,
    Blocked,
    Done,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 5] = [
        ItemStatus::New,
        ItemStatus::Ready,
        ItemStatus::InProgress,
        ItemStatus::Blocked,
        ItemStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "NEW",
            ItemStatus::Ready => "READY",
            ItemStatus::InProgress => "IN_PROGRESS",
            ItemStatus::Blocked => "BLOCKED",
            ItemStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ItemValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(ItemStatus::New),
            "READY" => Ok(ItemStatus::Ready),
            "IN_PROGRESS" => Ok(ItemStatus::InProgress),
            "BLOCKED" => Ok(ItemStatus::Blocked),
            "DONE" => Ok(ItemStatus::Done),
            _ => Err(ItemValidationError::UnknownStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub story_points: i32,
    pub status: ItemStatus,
    pub priority: i32,
    pub assignee: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub external_ids: BTreeMap<String, String>,
}

impl BacklogItem {
    /// Fresh item in status NEW with priority 0 and no tags or external ids.
    pub fn new(
        item_type: ItemType,
        title: impl Into<String>,
        description: Option<String>,
        now_ms: i64,
    ) -> Result<Self, ItemValidationError> {
        let title = normalize_title(title.into())?;
        Ok(Self {
            id: Uuid::now_v7(),
            item_type,
            parent_id: None,
            title,
            description,
            story_points: 0,
            status: ItemStatus::New,
            priority: 0,
            assignee: None,
            tags: BTreeSet::new(),
            created_at: now_ms,
            updated_at: now_ms,
            external_ids: BTreeMap::new(),
        })
    }

    pub fn rename(&mut self, title: impl Into<String>) -> Result<(), ItemValidationError> {
        self.title = normalize_title(title.into())?;
        Ok(())
    }

    pub fn set_story_points(&mut self, points: i32) -> Result<(), ItemValidationError> {
        if points < 0 {
            return Err(ItemValidationError::NegativeStoryPoints(points));
        }
        self.story_points = points;
        Ok(())
    }

    /// Only checks what the item can check alone. The parent's type is
    /// verified against `ItemType::accepts_child` by the caller.
    pub fn set_parent(&mut self, parent_id: Option<Uuid>) -> Result<(), ItemValidationError> {
        if let Some(parent_id) = parent_id {
            if self.item_type == ItemType::Epic {
                return Err(ItemValidationError::EpicWithParent);
            }
            if parent_id == self.id {
                return Err(ItemValidationError::SelfParent);
            }
        }
        self.parent_id = parent_id;
        Ok(())
    }

    pub fn replace_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags
            .into_iter()
            .map(|t| Into::<String>::into(t).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }

    pub fn set_external_id(&mut self, system: impl Into<String>, external_id: impl Into<String>) {
        self.external_ids.insert(system.into(), external_id.into());
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.created_at);
    }

    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.title.trim().is_empty() {
            return Err(ItemValidationError::EmptyTitle);
        }
        if self.story_points < 0 {
            return Err(ItemValidationError::NegativeStoryPoints(self.story_points));
        }
        if self.item_type == ItemType::Epic && self.parent_id.is_some() {
            return Err(ItemValidationError::EpicWithParent);
        }
        Ok(())
    }
}

fn normalize_title(title: String) -> Result<String, ItemValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ItemValidationError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}
