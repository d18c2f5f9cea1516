//! Live-read credential access with a short-lived cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use voxcall_db::DbPool;
use voxcall_types::CredentialKey;

use crate::{store, CredentialError};

/// Default cache lifetime for credential reads.
const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Default)]
struct CacheMap {
    /// Bumped on every invalidation. A read only caches its value if no
    /// invalidation happened while it was in flight.
    generation: u64,
    entries: HashMap<CredentialKey, (Option<String>, Instant)>,
}

/// Shared, cheaply cloneable handle to the credential table.
///
/// Reads are served from an in-memory cache for at most `ttl`; every write
/// through this handle clears the cache.
#[derive(Clone)]
pub struct CredentialStore {
    pool: DbPool,
    ttl: Duration,
    /// Uses `std::sync::RwLock`: guards are never held across `.await`.
    cache: Arc<RwLock<CacheMap>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("ttl", &self.ttl)
            .field("cache", &"[REDACTED]")
            .finish()
    }
}

impl CredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_ttl(pool, DEFAULT_TTL)
    }

    /// A zero `ttl` disables caching.
    pub fn with_ttl(pool: DbPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cache: Arc::new(RwLock::new(CacheMap::default())),
        }
    }

    fn cached(&self, key: CredentialKey) -> Option<Option<String>> {
        if self.ttl.is_zero() {
            return None;
        }
        let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
        cache
            .entries
            .get(&key)
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    fn generation(&self) -> u64 {
        self.cache
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .generation
    }

    fn remember(&self, key: CredentialKey, value: &Option<String>, read_at: u64) {
        if self.ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
        if cache.generation != read_at {
            return;
        }
        cache.entries.insert(key, (value.clone(), Instant::now()));
    }

    /// Drops every cached value, including values still being read.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
        cache.generation = cache.generation.wrapping_add(1);
        cache.entries.clear();
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CredentialError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, CredentialError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| CredentialError::Task(e.to_string()))?
    }

    /// Reads a credential, returning `None` when absent or blank.
    pub async fn get(&self, key: CredentialKey) -> Result<Option<String>, CredentialError> {
        if let Some(value) = self.cached(key) {
            return Ok(value);
        }
        let read_at = self.generation();
        let value = self
            .blocking(move |conn| store::get_credential(conn, key))
            .await?;
        self.remember(key, &value, read_at);
        Ok(value)
    }

    /// Reads a credential that must be present.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` naming the key when it is absent.
    pub async fn require(&self, key: CredentialKey) -> Result<String, CredentialError> {
        self.get(key)
            .await?
            .ok_or_else(|| CredentialError::Missing(vec![key]))
    }

    /// Reads several credentials that must all be present, in `keys` order.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` listing every absent key.
    pub async fn require_all(&self, keys: &[CredentialKey]) -> Result<Vec<String>, CredentialError> {
        let mut values = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.get(*key).await? {
                Some(value) => values.push(value),
                None => missing.push(*key),
            }
        }
        if missing.is_empty() {
            Ok(values)
        } else {
            Err(CredentialError::Missing(missing))
        }
    }

    /// Returns which of `keys` are absent, bypassing the cache.
    pub async fn missing(&self, keys: &[CredentialKey]) -> Result<Vec<CredentialKey>, CredentialError> {
        let keys = keys.to_vec();
        self.blocking(move |conn| store::missing_credentials(conn, &keys))
            .await
    }

    /// Lists stored credentials, bypassing the cache.
    pub async fn list(&self) -> Result<Vec<(CredentialKey, String)>, CredentialError> {
        self.blocking(|conn| store::list_credentials(conn)).await
    }

    /// Upserts credentials and clears the cache.
    pub async fn set_many(&self, entries: Vec<(CredentialKey, String)>) -> Result<(), CredentialError> {
        let result = self
            .blocking(move |conn| store::set_credentials(conn, &entries))
            .await;
        self.invalidate();
        result
    }

    /// Adds to the credit balance and returns the new balance.
    pub async fn add_credits(&self, amount: i64) -> Result<i64, CredentialError> {
        let result = self
            .blocking(move |conn| store::add_credits(conn, amount))
            .await;
        self.invalidate();
        result
    }
}
