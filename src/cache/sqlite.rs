//! SQLite-backed [`CacheStore`].
//!
//! Each namespace is its own table with the schema created by
//! [`crate::migrate::run_migrations`]:
//! `(key TEXT PRIMARY KEY, payload TEXT NOT NULL, timestamp INTEGER NOT NULL)`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{CacheEntry, CacheNamespace, CacheStore, NamespaceStats};

pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, ns: CacheNamespace, key: &str) -> Result<Option<CacheEntry>> {
        let sql = format!(
            "SELECT key, payload, timestamp FROM {} WHERE key = ?",
            ns.table()
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| CacheEntry {
            key: r.get("key"),
            payload: r.get("payload"),
            timestamp: r.get("timestamp"),
        }))
    }

    async fn put(&self, ns: CacheNamespace, entry: &CacheEntry) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (key, payload, timestamp) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                timestamp = excluded.timestamp
            "#,
            ns.table()
        );
        sqlx::query(&sql)
            .bind(&entry.key)
            .bind(&entry.payload)
            .bind(entry.timestamp)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn stats(&self, ns: CacheNamespace, fresh_since: i64) -> Result<NamespaceStats> {
        let sql = format!(
            "SELECT COUNT(*) AS entries, COALESCE(SUM(timestamp >= ?), 0) AS fresh FROM {}",
            ns.table()
        );
        let row = sqlx::query(&sql)
            .bind(fresh_since)
            .fetch_one(&self.pool)
            .await?;

        let entries: i64 = row.get("entries");
        let fresh: i64 = row.get("fresh");
        Ok(NamespaceStats {
            entries: entries as u64,
            fresh: fresh as u64,
        })
    }

    async fn clear(&self, ns: CacheNamespace) -> Result<u64> {
        let sql = format!("DELETE FROM {}", ns.table());
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
