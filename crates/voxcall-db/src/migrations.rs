//! Embedded SQL migration runner.
//!
//! Migrations run sequentially on startup and are tracked in the
//! `_voxcall_migrations` table. Each one runs exactly once, inside its own
//! transaction together with its tracking row.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_credentials",
        sql: include_str!("migrations/001_credentials.sql"),
    },
    Migration {
        name: "002_call_sessions",
        sql: include_str!("migrations/002_call_sessions.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection and returns how
/// many were applied.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _voxcall_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_voxcall_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _voxcall_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _voxcall_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}
