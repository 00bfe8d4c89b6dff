//! Durable cache with time-gated freshness.
//!
//! Two independent namespaces share one storage abstraction:
//!
//! | Namespace | Table | Key | Payload |
//! |-----------|-------|-----|---------|
//! | [`CacheNamespace::Repo`] | `repo_cache` | `owner/repo` | full [`AnalysisResult`] |
//! | [`CacheNamespace::User`] | `user_cache` | `login` | one [`InfluencerProfile`] |
//!
//! [`CacheStore`] is the raw key/payload/timestamp table. [`DurableCache`]
//! layers the TTL and JSON encoding on top. Entries are never evicted; a read
//! simply ignores anything older than the TTL, and the next write for that key
//! overwrites it.
//!
//! The cache is constructed once at startup and handed to the pipeline. It has
//! no close step; dropping the last handle releases the pool.

pub mod memory;
pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::models::{AnalysisResult, InfluencerProfile, RepositoryTarget};

pub use memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    Repo,
    User,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 2] = [CacheNamespace::Repo, CacheNamespace::User];

    pub fn table(&self) -> &'static str {
        match self {
            CacheNamespace::Repo => "repo_cache",
            CacheNamespace::User => "user_cache",
        }
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON.
    pub payload: String,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceStats {
    pub entries: u64,
    pub fresh: u64,
}

/// Raw storage for cache rows.
///
/// Reads and writes are single-key; concurrent writers to the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<CacheEntry>>;

    /// Inserts or replaces the row for `entry.key`.
    async fn put(&self, ns: CacheNamespace, entry: &CacheEntry) -> Result<()>;

    /// Counts all rows and rows written at or after `fresh_since` (epoch ms).
    async fn stats(&self, ns: CacheNamespace, fresh_since: i64) -> Result<NamespaceStats>;

    /// Deletes every row in the namespace, returning how many were removed.
    async fn clear(&self, ns: CacheNamespace) -> Result<u64>;
}

/// TTL-aware cache handle passed into the pipeline.
#[derive(Clone)]
pub struct DurableCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DurableCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn sqlite(pool: SqlitePool, ttl: Duration) -> Self {
        Self::new(Arc::new(SqliteCacheStore::new(pool)), ttl)
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// `now - timestamp < ttl`.
    pub fn is_fresh(&self, entry: &CacheEntry, now_millis: i64) -> bool {
        now_millis.saturating_sub(entry.timestamp) < self.ttl_millis()
    }

    /// Returns the decoded payload for `key` if a fresh entry exists.
    ///
    /// A payload that no longer decodes is logged and treated as a miss.
    pub async fn get_fresh<T: DeserializeOwned>(
        &self,
        ns: CacheNamespace,
        key: &str,
    ) -> Result<Option<T>> {
        let Some(entry) = self.store.get(ns, key).await? else {
            return Ok(None);
        };
        if !self.is_fresh(&entry, now_millis()) {
            return Ok(None);
        }
        match serde_json::from_str(&entry.payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(table = ns.table(), key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn put<T: Serialize>(&self, ns: CacheNamespace, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)
            .with_context(|| format!("Failed to encode {} entry '{}'", ns.table(), key))?;
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            timestamp: now_millis(),
        };
        self.store.put(ns, &entry).await
    }

    pub async fn repo_result(&self, target: &RepositoryTarget) -> Result<Option<AnalysisResult>> {
        self.get_fresh(CacheNamespace::Repo, &target.cache_key())
            .await
    }

    pub async fn store_repo_result(
        &self,
        target: &RepositoryTarget,
        result: &AnalysisResult,
    ) -> Result<()> {
        self.put(CacheNamespace::Repo, &target.cache_key(), result)
            .await
    }

    pub async fn user_profile(&self, login: &str) -> Result<Option<InfluencerProfile>> {
        self.get_fresh(CacheNamespace::User, login).await
    }

    pub async fn store_user_profile(&self, profile: &InfluencerProfile) -> Result<()> {
        self.put(CacheNamespace::User, &profile.login, profile).await
    }

    pub async fn stats(&self, ns: CacheNamespace) -> Result<NamespaceStats> {
        let fresh_since = now_millis().saturating_sub(self.ttl_millis()) + 1;
        self.store.stats(ns, fresh_since).await
    }

    pub async fn clear(&self, ns: CacheNamespace) -> Result<u64> {
        self.store.clear(ns).await
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
