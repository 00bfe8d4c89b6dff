use anyhow::Result;
use sqlx::SqlitePool;

use crate::cache::CacheNamespace;
use crate::config::Config;
use crate::db;

/// Creates the database file and cache tables, then closes the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema setup; safe to run on every startup.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for ns in CacheNamespace::ALL {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
            ns.table()
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
