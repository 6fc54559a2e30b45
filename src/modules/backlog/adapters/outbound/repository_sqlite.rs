// SQLite implementation of the BacklogRepository and MetricsQueries ports.
//
// Invariants
// - Write paths validate the item before touching SQL.
// - Read paths reject invalid persisted rows instead of masking them.
// - `list` narrows by the indexed columns in SQL and hands the rest to the
//   shared `ItemFilter` so both adapters agree on semantics.

use crate::modules::backlog::adapters::outbound::repository::{
    BacklogRepository, MetricsQueries, RepositoryError,
};
use crate::modules::backlog::core::filter::{ItemFilter, apply_filter};
use crate::modules::backlog::core::item::{BacklogItem, ItemStatus, ItemType};
use crate::shared::core::primitives::{MILLIS_PER_DAY, days_ago};
use crate::shared::infrastructure::sqlite::{SharedConnection, with_connection};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    item_type,
    parent_id,
    title,
    description,
    story_points,
    status,
    priority,
    assignee,
    tags,
    created_at,
    updated_at,
    external_ids
FROM backlog_items";

#[derive(Clone)]
pub struct SqliteBacklogRepository {
    conn: SharedConnection,
}

impl SqliteBacklogRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        with_connection(&self.conn, f).await
    }
}

#[async_trait::async_trait]
impl BacklogRepository for SqliteBacklogRepository {
    async fn create(&self, item: &BacklogItem) -> Result<(), RepositoryError> {
        item.validate()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        let item = item.clone();
        self.run(move |conn| {
            let tags = encode_json(&item.tags)?;
            let external_ids = encode_json(&item.external_ids)?;
            let result = conn.execute(
                "INSERT INTO backlog_items (
                    id,
                    item_type,
                    parent_id,
                    title,
                    description,
                    story_points,
                    status,
                    priority,
                    assignee,
                    tags,
                    created_at,
                    updated_at,
                    external_ids
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
                params![
                    item.id.to_string(),
                    item.item_type.as_str(),
                    item.parent_id.map(|p| p.to_string()),
                    item.title.as_str(),
                    item.description.as_deref(),
                    item.story_points,
                    item.status.as_str(),
                    item.priority,
                    item.assignee.as_deref(),
                    tags,
                    item.created_at,
                    item.updated_at,
                    external_ids,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_primary_key_violation(&e) => Err(RepositoryError::Duplicate(item.id)),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<BacklogItem>, RepositoryError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
            let mut rows = stmt.query([id.to_string()])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_item_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn get_by_external_id(
        &self,
        system: &str,
        external_id: &str,
    ) -> Result<Option<BacklogItem>, RepositoryError> {
        let system = system.to_string();
        let external_id = external_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{ITEM_SELECT_SQL}
                 WHERE EXISTS (
                    SELECT 1 FROM json_each(backlog_items.external_ids)
                    WHERE json_each.key = ?1 AND json_each.value = ?2
                 )
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1;"
            ))?;
            let mut rows = stmt.query(params![system, external_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_item_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update(&self, item: &BacklogItem) -> Result<(), RepositoryError> {
        item.validate()
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        let item = item.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE backlog_items
                 SET
                    parent_id = ?1,
                    title = ?2,
                    description = ?3,
                    story_points = ?4,
                    status = ?5,
                    priority = ?6,
                    assignee = ?7,
                    tags = ?8,
                    updated_at = ?9,
                    external_ids = ?10
                 WHERE id = ?11;",
                params![
                    item.parent_id.map(|p| p.to_string()),
                    item.title.as_str(),
                    item.description.as_deref(),
                    item.story_points,
                    item.status.as_str(),
                    item.priority,
                    item.assignee.as_deref(),
                    encode_json(&item.tags)?,
                    item.updated_at,
                    encode_json(&item.external_ids)?,
                    item.id.to_string(),
                ],
            )?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(item.id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.run(move |conn| {
            let changed = conn.execute("DELETE FROM backlog_items WHERE id = ?1;", [id.to_string()])?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn list(&self, filter: &ItemFilter) -> Result<(Vec<BacklogItem>, usize), RepositoryError> {
        let filter = filter.clone();
        self.run(move |conn| {
            let mut sql = format!("{ITEM_SELECT_SQL} WHERE 1 = 1");
            let mut bind_values: Vec<Value> = Vec::new();

            if !filter.types.is_empty() {
                sql.push_str(&format!(" AND item_type IN ({})", placeholders(filter.types.len())));
                bind_values.extend(filter.types.iter().map(|t| Value::Text(t.as_str().to_string())));
            }
            if !filter.statuses.is_empty() {
                sql.push_str(&format!(" AND status IN ({})", placeholders(filter.statuses.len())));
                bind_values.extend(
                    filter
                        .statuses
                        .iter()
                        .map(|s| Value::Text(s.as_str().to_string())),
                );
            }
            if let Some(parent_id) = filter.parent_id {
                sql.push_str(" AND parent_id = ?");
                bind_values.push(Value::Text(parent_id.to_string()));
            }

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(parse_item_row(row)?);
            }
            Ok(apply_filter(items, &filter))
        })
        .await
    }

    async fn children(&self, parent_id: Uuid) -> Result<Vec<BacklogItem>, RepositoryError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{ITEM_SELECT_SQL}
                 WHERE parent_id = ?1
                 ORDER BY priority ASC, created_at ASC, id ASC;"
            ))?;
            let mut rows = stmt.query([parent_id.to_string()])?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(parse_item_row(row)?);
            }
            Ok(items)
        })
        .await
    }

    async fn has_children(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.run(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM backlog_items WHERE parent_id = ?1 LIMIT 1;",
                    [id.to_string()],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn update_priorities(
        &self,
        priorities: &BTreeMap<Uuid, i32>,
        now_ms: i64,
    ) -> Result<(), RepositoryError> {
        let priorities = priorities.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for (id, priority) in &priorities {
                let changed = tx.execute(
                    "UPDATE backlog_items
                     SET priority = ?1, updated_at = max(updated_at, ?2)
                     WHERE id = ?3;",
                    params![priority, now_ms, id.to_string()],
                )?;
                if changed == 0 {
                    // Dropping the transaction rolls back the rows already written.
                    return Err(RepositoryError::NotFound(*id));
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait::async_trait]
impl MetricsQueries for SqliteBacklogRepository {
    async fn backlog_size(&self) -> Result<HashMap<ItemType, usize>, RepositoryError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item_type, COUNT(*)
                 FROM backlog_items
                 WHERE status != 'DONE'
                 GROUP BY item_type;",
            )?;
            let mut rows = stmt.query([])?;
            let mut sizes = HashMap::new();
            while let Some(row) = rows.next()? {
                let item_type = parse_item_type(&row.get::<_, String>(0)?)?;
                sizes.insert(item_type, row.get::<_, i64>(1)? as usize);
            }
            Ok(sizes)
        })
        .await
    }

    async fn average_age_by_type(
        &self,
        status: ItemStatus,
        now_ms: i64,
    ) -> Result<HashMap<ItemType, f64>, RepositoryError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT item_type, AVG(?1 - created_at)
                 FROM backlog_items
                 WHERE status = ?2
                 GROUP BY item_type;",
            )?;
            let mut rows = stmt.query(params![now_ms, status.as_str()])?;
            let mut ages = HashMap::new();
            while let Some(row) = rows.next()? {
                let item_type = parse_item_type(&row.get::<_, String>(0)?)?;
                let avg_ms: f64 = row.get(1)?;
                ages.insert(item_type, avg_ms / MILLIS_PER_DAY as f64);
            }
            Ok(ages)
        })
        .await
    }

    async fn wip_count(&self) -> Result<usize, RepositoryError> {
        self.run(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM backlog_items WHERE status = 'IN_PROGRESS';",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn lead_time_days(&self, window_days: u32, now_ms: i64) -> Result<f64, RepositoryError> {
        let since = days_ago(now_ms, window_days);
        self.run(move |conn| {
            let avg_ms: Option<f64> = conn.query_row(
                "SELECT AVG(updated_at - created_at)
                 FROM backlog_items
                 WHERE status = 'DONE' AND updated_at >= ?1;",
                [since],
                |row| row.get(0),
            )?;
            Ok(avg_ms.map_or(0.0, |ms| ms / MILLIS_PER_DAY as f64))
        })
        .await
    }

    async fn throughput(&self, window_days: u32, now_ms: i64) -> Result<usize, RepositoryError> {
        let since = days_ago(now_ms, window_days);
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM backlog_items
                 WHERE status = 'DONE' AND updated_at >= ?1;",
                [since],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn blocked_items(&self, now_ms: i64) -> Result<(usize, f64), RepositoryError> {
        self.run(move |conn| {
            let (count, avg_ms): (i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*), AVG(?1 - updated_at)
                 FROM backlog_items
                 WHERE status = 'BLOCKED';",
                [now_ms],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((
                count as usize,
                avg_ms.map_or(0.0, |ms| ms / MILLIS_PER_DAY as f64),
            ))
        })
        .await
    }

    async fn ageing_items(
        &self,
        threshold_days: u32,
        now_ms: i64,
    ) -> Result<usize, RepositoryError> {
        let cutoff = days_ago(now_ms, threshold_days);
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM backlog_items
                 WHERE status != 'DONE' AND created_at < ?1;",
                [cutoff],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn story_points_in_window(
        &self,
        window_days: u32,
        now_ms: i64,
    ) -> Result<(i64, i64), RepositoryError> {
        let since = days_ago(now_ms, window_days);
        self.run(move |conn| {
            let points = conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN status = 'DONE' AND updated_at >= ?1
                                      THEN story_points END), 0),
                    COALESCE(SUM(CASE WHEN created_at >= ?1
                                      THEN story_points END), 0)
                 FROM backlog_items;",
                [since],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;
            Ok(points)
        })
        .await
    }

    async fn type_counts(&self) -> Result<HashMap<ItemType, usize>, RepositoryError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item_type, COUNT(*)
                 FROM backlog_items
                 GROUP BY item_type;",
            )?;
            let mut rows = stmt.query([])?;
            let mut counts = HashMap::new();
            while let Some(row) = rows.next()? {
                let item_type = parse_item_type(&row.get::<_, String>(0)?)?;
                counts.insert(item_type, row.get::<_, i64>(1)? as usize);
            }
            Ok(counts)
        })
        .await
    }
}

fn parse_item_row(row: &Row<'_>) -> Result<BacklogItem, RepositoryError> {
    let id = parse_uuid(&row.get::<_, String>("id")?, "id")?;
    let parent_id = match row.get::<_, Option<String>>("parent_id")? {
        Some(value) => Some(parse_uuid(&value, "parent_id")?),
        None => None,
    };
    let status_text: String = row.get("status")?;
    let status = status_text.parse::<ItemStatus>().map_err(|_| {
        RepositoryError::InvalidData(format!(
            "invalid status `{status_text}` in backlog_items.status"
        ))
    })?;
    let tags_text: String = row.get("tags")?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_text).map_err(|e| {
        RepositoryError::InvalidData(format!("invalid tags `{tags_text}`: {e}"))
    })?;
    let external_ids_text: String = row.get("external_ids")?;
    let external_ids: BTreeMap<String, String> = serde_json::from_str(&external_ids_text)
        .map_err(|e| {
            RepositoryError::InvalidData(format!(
                "invalid external ids `{external_ids_text}`: {e}"
            ))
        })?;

    let item = BacklogItem {
        id,
        item_type: parse_item_type(&row.get::<_, String>("item_type")?)?,
        parent_id,
        title: row.get("title")?,
        description: row.get("description")?,
        story_points: row.get("story_points")?,
        status,
        priority: row.get("priority")?,
        assignee: row.get("assignee")?,
        tags,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        external_ids,
    };
    item.validate()
        .map_err(|e| RepositoryError::InvalidData(format!("row {id}: {e}")))?;
    Ok(item)
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|_| {
        RepositoryError::InvalidData(format!("invalid uuid `{value}` in backlog_items.{column}"))
    })
}

fn parse_item_type(value: &str) -> Result<ItemType, RepositoryError> {
    value.parse::<ItemType>().map_err(|_| {
        RepositoryError::InvalidData(format!("invalid item type `{value}` in backlog_items.item_type"))
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::InvalidData(e.to_string()))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn is_primary_key_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
