use crate::modules::backlog::core::item::BacklogItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Discriminant of a `BacklogEvent`, also the `kind` column of the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    ItemsReordered,
    ExternalIdSet,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::ItemCreated,
        EventKind::ItemUpdated,
        EventKind::ItemDeleted,
        EventKind::ItemsReordered,
        EventKind::ExternalIdSet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemCreated => "ITEM_CREATED",
            EventKind::ItemUpdated => "ITEM_UPDATED",
            EventKind::ItemDeleted => "ITEM_DELETED",
            EventKind::ItemsReordered => "ITEMS_REORDERED",
            EventKind::ExternalIdSet => "EXTERNAL_ID_SET",
        }
    }

    /// Message bus topic the event is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::ItemCreated => "item.created",
            EventKind::ItemUpdated => "item.updated",
            EventKind::ItemDeleted => "item.deleted",
            EventKind::ItemsReordered => "items.reordered",
            EventKind::ExternalIdSet => "item.external_id.set",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ITEM_CREATED" => Ok(EventKind::ItemCreated),
            "ITEM_UPDATED" => Ok(EventKind::ItemUpdated),
            "ITEM_DELETED" => Ok(EventKind::ItemDeleted),
            "ITEMS_REORDERED" => Ok(EventKind::ItemsReordered),
            "EXTERNAL_ID_SET" => Ok(EventKind::ExternalIdSet),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BacklogEvent {
    ItemCreated {
        item: BacklogItem,
    },
    ItemUpdated {
        item: BacklogItem,
    },
    ItemDeleted {
        item: BacklogItem,
    },
    ItemsReordered {
        priorities: BTreeMap<Uuid, i32>,
    },
    ExternalIdSet {
        system: String,
        external_id: String,
    },
}

impl BacklogEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BacklogEvent::ItemCreated { .. } => EventKind::ItemCreated,
            BacklogEvent::ItemUpdated { .. } => EventKind::ItemUpdated,
            BacklogEvent::ItemDeleted { .. } => EventKind::ItemDeleted,
            BacklogEvent::ItemsReordered { .. } => EventKind::ItemsReordered,
            BacklogEvent::ExternalIdSet { .. } => EventKind::ExternalIdSet,
        }
    }
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    /// Absent for the batch-level reorder event.
    pub item_id: Option<Uuid>,
    pub timestamp: i64,
    pub payload: BacklogEvent,
}

impl DomainEvent {
    pub fn new(item_id: Option<Uuid>, timestamp: i64, payload: BacklogEvent) -> Self {
        Self {
            id: Uuid::now_v7(),
            item_id,
            timestamp,
            payload,
        }
    }

    pub fn item_created(item: &BacklogItem, timestamp: i64) -> Self {
        Self::new(
            Some(item.id),
            timestamp,
            BacklogEvent::ItemCreated { item: item.clone() },
        )
    }

    pub fn item_updated(item: &BacklogItem, timestamp: i64) -> Self {
        Self::new(
            Some(item.id),
            timestamp,
            BacklogEvent::ItemUpdated { item: item.clone() },
        )
    }

    pub fn item_deleted(item: &BacklogItem, timestamp: i64) -> Self {
        Self::new(
            Some(item.id),
            timestamp,
            BacklogEvent::ItemDeleted { item: item.clone() },
        )
    }

    pub fn items_reordered(priorities: BTreeMap<Uuid, i32>, timestamp: i64) -> Self {
        Self::new(None, timestamp, BacklogEvent::ItemsReordered { priorities })
    }

    pub fn external_id_set(
        item_id: Uuid,
        system: impl Into<String>,
        external_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self::new(
            Some(item_id),
            timestamp,
            BacklogEvent::ExternalIdSet {
                system: system.into(),
                external_id: external_id.into(),
            },
        )
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Decodes a stored payload, checking it against the stored kind column.
    pub fn decode(
        id: Uuid,
        item_id: Option<Uuid>,
        timestamp: i64,
        kind: &str,
        payload: &str,
    ) -> Result<Self, EventDecodeError> {
        let kind: EventKind = kind.parse()?;
        let payload: BacklogEvent = serde_json::from_str(payload)?;
        if payload.kind() != kind {
            return Err(EventDecodeError::KindMismatch {
                column: kind,
                payload: payload.kind(),
            });
        }
        Ok(Self {
            id,
            item_id,
            timestamp,
            payload,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownEventKind),

    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("event kind column {column} does not match payload kind {payload}")]
    KindMismatch { column: EventKind, payload: EventKind },
}
