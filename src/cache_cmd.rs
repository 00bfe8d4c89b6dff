//! The `sgr cache` commands: inspect and invalidate the durable cache.

use anyhow::{bail, Result};

use crate::cache::{CacheNamespace, DurableCache};
use crate::config::Config;
use crate::db;

/// Which namespaces a `cache clear` applies to.
pub fn parse_scope(scope: &str) -> Result<Vec<CacheNamespace>> {
    match scope {
        "repo" => Ok(vec![CacheNamespace::Repo]),
        "user" => Ok(vec![CacheNamespace::User]),
        "all" => Ok(CacheNamespace::ALL.to_vec()),
        other => bail!("unknown cache scope '{}': expected repo, user, or all", other),
    }
}

fn label(ns: CacheNamespace) -> &'static str {
    match ns {
        CacheNamespace::Repo => "repo",
        CacheNamespace::User => "user",
    }
}

pub async fn run_cache_stats(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let cache = DurableCache::sqlite(pool.clone(), config.cache.ttl());

    println!("Stargazer Rank: Cache Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  TTL:         {}s", cache.ttl().as_secs());
    println!();
    println!("  {:<10} {:>10} {:>10}", "NAMESPACE", "ENTRIES", "FRESH");
    println!("  {}", "-".repeat(32));

    for ns in CacheNamespace::ALL {
        let stats = cache.stats(ns).await?;
        println!("  {:<10} {:>10} {:>10}", label(ns), stats.entries, stats.fresh);
    }
    println!();

    pool.close().await;
    Ok(())
}

pub async fn run_cache_clear(config: &Config, scope: &str) -> Result<()> {
    let namespaces = parse_scope(scope)?;
    let pool = db::open(config).await?;
    let cache = DurableCache::sqlite(pool.clone(), config.cache.ttl());

    for ns in namespaces {
        let removed = cache.clear(ns).await?;
        println!("Cleared {} {} cache entries.", removed, label(ns));
    }

    pool.close().await;
    Ok(())
}
