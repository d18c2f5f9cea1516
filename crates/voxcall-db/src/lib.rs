//! Database layer for voxcall.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Both persisted stores, the credential table
//! and the call-session transcripts, are created through the versioned
//! migrations in this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: webhook handlers for different calls read and
//!   write concurrently; WAL gives concurrent readers alongside one writer.
//! - **Bounded busy timeout**: a locked database must not stall a webhook
//!   past the carrier's response deadline, so writers give up after
//!   `busy_timeout_ms`.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
