// SQLite bootstrap shared by the repository and event log adapters.
//
// Invariants
// - Returned connections have `foreign_keys=ON` and every migration applied.
// - Async adapters reach the connection through `SharedConnection` and run
//   their statements on the blocking pool.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod migrations;

pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },

    #[error("schema step {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(String),
}

pub fn open_db(path: impl AsRef<Path>) -> Result<Connection, DbError> {
    let path = path.as_ref();
    open_with(|| Connection::open(path), "file")
}

pub fn open_db_in_memory() -> Result<Connection, DbError> {
    open_with(Connection::open_in_memory, "memory")
}

pub fn shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Runs `f` against the shared connection on tokio's blocking pool.
pub async fn with_connection<T, E, F>(conn: &SharedConnection, f: F) -> Result<T, E>
where
    T: Send + 'static,
    E: From<DbError> + Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().map_err(|_| E::from(DbError::Poisoned))?;
        f(&mut guard)
    })
    .await
    .map_err(|e| E::from(DbError::Join(e.to_string())))?
}

fn open_with(
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    mode: &'static str,
) -> Result<Connection, DbError> {
    let started_at = Instant::now();
    tracing::info!(mode, "opening database");

    let mut conn = open().inspect_err(|e| {
        tracing::error!(
            mode,
            duration_ms = started_at.elapsed().as_millis() as u64,
            error = %e,
            "database open failed"
        );
    })?;

    match bootstrap(&mut conn) {
        Ok(()) => {
            tracing::info!(
                mode,
                duration_ms = started_at.elapsed().as_millis() as u64,
                "database ready"
            );
            Ok(conn)
        }
        Err(e) => {
            tracing::error!(
                mode,
                duration_ms = started_at.elapsed().as_millis() as u64,
                error = %e,
                "database bootstrap failed"
            );
            Err(e)
        }
    }
}

fn bootstrap(conn: &mut Connection) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let version = migrations::migrate(conn)?;
    tracing::debug!(version, "schema up to date");
    Ok(())
}
