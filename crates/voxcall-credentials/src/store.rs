//! Synchronous credential table operations.

use rusqlite::{params, Connection, OptionalExtension};
use voxcall_types::CredentialKey;

use crate::CredentialError;

/// Reads one credential. Blank values read back as `None`.
pub fn get_credential(
    conn: &Connection,
    key: CredentialKey,
) -> Result<Option<String>, CredentialError> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM credentials WHERE key = ?1",
            [key.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Inserts or replaces one credential.
pub fn set_credential(
    conn: &Connection,
    key: CredentialKey,
    value: &str,
) -> Result<(), CredentialError> {
    conn.execute(
        "INSERT INTO credentials (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![key.as_str(), value],
    )?;
    tracing::info!(key = key.as_str(), "credential updated");
    Ok(())
}

/// Upserts several credentials in one transaction.
pub fn set_credentials(
    conn: &mut Connection,
    entries: &[(CredentialKey, String)],
) -> Result<(), CredentialError> {
    let tx = conn.transaction()?;
    for (key, value) in entries {
        set_credential(&tx, *key, value)?;
    }
    tx.commit()?;
    Ok(())
}

/// Returns every stored, non-blank credential in [`CredentialKey::ALL`] order.
pub fn list_credentials(conn: &Connection) -> Result<Vec<(CredentialKey, String)>, CredentialError> {
    let mut found = Vec::new();
    for key in CredentialKey::ALL {
        if let Some(value) = get_credential(conn, key)? {
            found.push((key, value));
        }
    }
    Ok(found)
}

/// Returns the subset of `keys` that is absent or blank.
pub fn missing_credentials(
    conn: &Connection,
    keys: &[CredentialKey],
) -> Result<Vec<CredentialKey>, CredentialError> {
    let mut missing = Vec::new();
    for key in keys {
        if get_credential(conn, *key)?.is_none() {
            missing.push(*key);
        }
    }
    Ok(missing)
}

/// Adds `amount` to the stored credit balance and returns the new balance.
///
/// A missing or unparsable balance counts as zero.
pub fn add_credits(conn: &mut Connection, amount: i64) -> Result<i64, CredentialError> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let current = get_credential(&tx, CredentialKey::Credits)?
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);

    let balance = current
        .checked_add(amount)
        .filter(|b| *b >= 0)
        .ok_or_else(|| {
            CredentialError::InvalidCredits(format!(
                "adding {amount} to balance {current} is out of range"
            ))
        })?;

    set_credential(&tx, CredentialKey::Credits, &balance.to_string())?;
    tx.commit()?;
    Ok(balance)
}
