//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use thiserror::Error;

/// Path that selects a private in-memory database.
const MEMORY_PATH: &str = ":memory:";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 2_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    /// Failed to create the directory holding the database file.
    #[error("failed to create database directory: {0}")]
    Directory(#[from] std::io::Error),
}

/// Creates a new SQLite connection pool with WAL mode enabled.
///
/// # Arguments
///
/// * `db_path` - Path to the SQLite database file. Missing parent
///   directories are created. Use `:memory:` for an in-memory database;
///   every SQLite connection to `:memory:` opens its own empty database, so
///   the pool is capped at a single connection in that case.
///
/// # Errors
///
/// Returns `PoolError` if the directory or the connection pool cannot be
/// created.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let in_memory = db_path == MEMORY_PATH;

    if !in_memory {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory" which is expected.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    let max_size = if in_memory { 1 } else { settings.pool_max_size };

    let pool = Pool::builder().max_size(max_size).build(manager)?;

    tracing::debug!(path = db_path, max_size, "database pool ready");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_in_memory_pool_uses_single_connection() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_500,
            pool_max_size: 4,
        };

        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 1, "in-memory pools must share one connection");

        let conn = pool.get().expect("should get a connection");
        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 1_500, "busy timeout should match settings");
    }

    #[test]
    fn create_file_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/data/voxcall.db");
        let path_str = path.to_str().expect("utf-8 path");

        let pool = create_pool(path_str, DbRuntimeSettings::default())
            .expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 8);

        let conn = pool.get().expect("should get a connection");
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");
        assert!(path.exists(), "database file should be created");
    }
}
