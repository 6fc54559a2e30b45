// Schema steps for the backlog database.
//
// Invariants
// - `PRAGMA user_version` holds the last step that committed.
// - Each step commits on its own, so a failing step leaves the database at
//   the previous version instead of rolling back earlier steps.

use crate::shared::infrastructure::sqlite::DbError;
use rusqlite::Connection;
use std::cmp::Ordering;

/// `(version, script)` pairs, versions strictly increasing.
type SchemaStep = (u32, &'static str);

const SCHEMA: &[SchemaStep] = &[
    (1, include_str!("migrations/0001_backlog_items.sql")),
    (2, include_str!("migrations/0002_backlog_events.sql")),
];

pub fn schema_version(conn: &Connection) -> Result<u32, DbError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the database up to the newest backlog schema.
pub fn migrate(conn: &mut Connection) -> Result<u32, DbError> {
    run_steps(conn, SCHEMA)
}

fn run_steps(conn: &mut Connection, steps: &[SchemaStep]) -> Result<u32, DbError> {
    let found = schema_version(conn)?;
    let newest = steps.last().map_or(0, |(version, _)| *version);
    match found.cmp(&newest) {
        Ordering::Greater => {
            return Err(DbError::UnsupportedSchemaVersion {
                db_version: found,
                latest_supported: newest,
            });
        }
        Ordering::Equal => return Ok(found),
        Ordering::Less => {}
    }

    for &(version, script) in steps.iter().filter(|(version, _)| *version > found) {
        let tx = conn.transaction()?;
        tx.execute_batch(script)
            .map_err(|source| DbError::Migration { version, source })?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!(from = found, to = version, "schema step applied");
    }
    Ok(newest)
}
