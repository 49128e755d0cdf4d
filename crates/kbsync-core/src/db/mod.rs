//! SQLite-backed local sync store.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so `kbsync status` can read while a run writes
//! - `busy_timeout = 5s` to ride out transient lock contention
//! - `foreign_keys = ON` so descendant rows follow their ticket row

pub mod migrations;
pub mod schema;
pub mod store;

pub use store::Store;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ErrorCode;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the local store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to migrate store schema: {0}")]
    Migrate(#[source] rusqlite::Error),

    #[error("store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Open { .. } | Self::CreateDir { .. } | Self::Migrate(_) => {
                ErrorCode::StoreOpenFailed
            }
            Self::Sqlite(_) => ErrorCode::StoreWriteFailed,
        }
    }
}

/// Open (or create) the store database, apply pragmas and migrate.
///
/// # Errors
///
/// Returns [`StoreError`] if opening, configuring, or migrating fails.
pub fn open_store(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    configure_connection(&conn).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    migrations::migrate(&mut conn).map_err(StoreError::Migrate)?;

    Ok(conn)
}

/// Open a migrated in-memory store.
///
/// # Errors
///
/// Returns [`StoreError`] if migration fails.
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrate(&mut conn).map_err(StoreError::Migrate)?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, open_store};
    use crate::db::migrations;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("kbsync.db");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);

        assert_eq!(
            migrations::current_schema_version(&conn).expect("version"),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn reopening_keeps_schema_version() {
        let (_dir, path) = temp_db_path();
        drop(open_store(&path).expect("first open"));
        let conn = open_store(&path).expect("second open");
        assert_eq!(
            migrations::current_schema_version(&conn).expect("version"),
            migrations::LATEST_SCHEMA_VERSION
        );
    }
}
