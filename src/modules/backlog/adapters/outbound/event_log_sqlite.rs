// SQLite implementation of the EventLog port.
//
// Invariants
// - Rows are never updated (enforced by trigger).
// - `item_id` is the cascading FK. It is left NULL for events that must
//   outlive the item row (ITEM_DELETED) or have no single item
//   (ITEMS_REORDERED). `aggregate_id` always holds the event's item id.

use crate::modules::backlog::adapters::outbound::event_log::{EventLog, EventLogError};
use crate::modules::backlog::core::events::{DomainEvent, EventKind};
use crate::shared::infrastructure::sqlite::{SharedConnection, with_connection};
use rusqlite::{Connection, ErrorCode, Row, params};
use uuid::Uuid;

const EVENT_SELECT_SQL: &str = "SELECT id, kind, aggregate_id, payload, occurred_at FROM backlog_events";

#[derive(Clone)]
pub struct SqliteEventLog {
    conn: SharedConnection,
}

impl SqliteEventLog {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, EventLogError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, EventLogError> + Send + 'static,
    {
        with_connection(&self.conn, f).await
    }
}

#[async_trait::async_trait]
impl EventLog for SqliteEventLog {
    async fn store_event(&self, event: &DomainEvent) -> Result<(), EventLogError> {
        let event = event.clone();
        self.run(move |conn| {
            let kind = event.kind();
            let payload = serde_json::to_string(&event.payload)
                .map_err(|e| EventLogError::Backend(e.to_string()))?;
            let linked_item = match kind {
                EventKind::ItemDeleted | EventKind::ItemsReordered => None,
                _ => event.item_id,
            };
            let result = conn.execute(
                "INSERT INTO backlog_events (id, kind, item_id, aggregate_id, payload, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    event.id.to_string(),
                    kind.as_str(),
                    linked_item.map(|id| id.to_string()),
                    event.item_id.map(|id| id.to_string()),
                    payload,
                    event.timestamp,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    Err(EventLogError::Duplicate(event.id))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn events_for_item(&self, item_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{EVENT_SELECT_SQL} WHERE aggregate_id = ?1 ORDER BY occurred_at ASC, id ASC;"
            ))?;
            let mut rows = stmt.query([item_id.to_string()])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(parse_event_row(row)?);
            }
            Ok(events)
        })
        .await
    }

    async fn all_events(&self) -> Result<Vec<DomainEvent>, EventLogError> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare(&format!("{EVENT_SELECT_SQL} ORDER BY occurred_at ASC, id ASC;"))?;
            let mut rows = stmt.query([])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(parse_event_row(row)?);
            }
            Ok(events)
        })
        .await
    }
}

fn parse_event_row(row: &Row<'_>) -> Result<DomainEvent, EventLogError> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| EventLogError::Backend(format!("invalid event id `{id_text}`")))?;
    let item_id = match row.get::<_, Option<String>>("aggregate_id")? {
        Some(text) => Some(
            Uuid::parse_str(&text)
                .map_err(|_| EventLogError::Backend(format!("invalid aggregate id `{text}`")))?,
        ),
        None => None,
    };
    let kind: String = row.get("kind")?;
    let payload: String = row.get("payload")?;
    let timestamp: i64 = row.get("occurred_at")?;
    Ok(DomainEvent::decode(id, item_id, timestamp, &kind, &payload)?)
}
