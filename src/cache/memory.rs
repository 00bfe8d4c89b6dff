//! In-memory [`CacheStore`] for tests and throwaway runs.
//!
//! Uses a `HashMap` per namespace behind `std::sync::RwLock`. Nothing
//! survives the process.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::{CacheEntry, CacheNamespace, CacheStore, NamespaceStats};

pub struct InMemoryCacheStore {
    tables: RwLock<HashMap<CacheNamespace, HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory cache lock poisoned")
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<CacheEntry>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(&ns).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, ns: CacheNamespace, entry: &CacheEntry) -> Result<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables
            .entry(ns)
            .or_default()
            .insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn stats(&self, ns: CacheNamespace, fresh_since: i64) -> Result<NamespaceStats> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let Some(table) = tables.get(&ns) else {
            return Ok(NamespaceStats::default());
        };
        Ok(NamespaceStats {
            entries: table.len() as u64,
            fresh: table.values().filter(|e| e.timestamp >= fresh_since).count() as u64,
        })
    }

    async fn clear(&self, ns: CacheNamespace) -> Result<u64> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        Ok(tables.remove(&ns).map(|t| t.len() as u64).unwrap_or(0))
    }
}
