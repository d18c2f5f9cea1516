//! Provider credential store.
//!
//! Credentials (carrier account, language-model and synthesis API keys) live
//! in the `credentials` table, one row per [`CredentialKey`], written with
//! upsert semantics from the operator API.
//!
//! Request handlers never hold credentials in process-wide state loaded at
//! startup. They read through [`CredentialStore`], which caches values for a
//! short TTL and drops its cache on every write, so a key saved by the
//! operator takes effect on the next call without a restart.

mod cache;
mod store;

pub use cache::CredentialStore;
pub use store::{
    add_credits, get_credential, list_credentials, missing_credentials, set_credential,
    set_credentials,
};

use voxcall_types::CredentialKey;

/// Errors that can occur during credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// One or more required keys are absent or blank.
    #[error("missing credentials: {}", join_keys(.0))]
    Missing(Vec<CredentialKey>),

    /// A credit amount would drive the balance negative or overflow.
    #[error("invalid credit amount: {0}")]
    InvalidCredits(String),

    /// A database operation failed.
    #[error("credential database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No pooled connection was available.
    #[error("credential store connection failed: {0}")]
    Pool(#[from] r2d2::Error),

    /// The blocking database task panicked or was cancelled.
    #[error("credential store task failed: {0}")]
    Task(String),
}

fn join_keys(keys: &[CredentialKey]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
