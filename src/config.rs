use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::RetryPolicy;
use crate::score::ScoreWeights;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scoring: ScoreWeights,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Server-side credential used when a request does not bring its own.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Page size for stargazer and fork listings.
    #[serde(default = "default_page_size")]
    pub per_page: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            per_page: default_page_size(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_user_agent() -> String {
    "stargazer-rank".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> u32 {
    100
}

impl GitHubConfig {
    /// Picks the credential for one analysis run: the caller's token, then the
    /// configured one, then `GITHUB_TOKEN` from the environment.
    pub fn resolve_token(&self, supplied: Option<&str>) -> Option<String> {
        supplied
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| self.token.clone().filter(|t| !t.trim().is_empty()))
            .or_else(|| {
                std::env::var("GITHUB_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_page_size")]
    pub repo_page_size: u32,
    #[serde(default = "default_page_size")]
    pub event_page_size: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay_ms(),
            repo_page_size: default_page_size(),
            event_page_size: default_page_size(),
        }
    }
}

fn default_max_candidates() -> usize {
    1000
}
fn default_concurrency() -> usize {
    30
}
fn default_batch_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    25
}
fn default_delay_secs() -> u64 {
    15
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.delay_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Config with every default applied and the database under `./data`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/sgr.sqlite"),
            },
            github: GitHubConfig::default(),
            cache: CacheConfig::default(),
            ranking: RankingConfig::default(),
            retry: RetryConfig::default(),
            scoring: ScoreWeights::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if config.ranking.max_candidates == 0 {
        anyhow::bail!("ranking.max_candidates must be > 0");
    }
    if config.ranking.concurrency == 0 {
        anyhow::bail!("ranking.concurrency must be > 0");
    }

    for (name, size) in [
        ("github.per_page", config.github.per_page),
        ("ranking.repo_page_size", config.ranking.repo_page_size),
        ("ranking.event_page_size", config.ranking.event_page_size),
    ] {
        if !(1..=100).contains(&size) {
            anyhow::bail!("{} must be in [1, 100], got {}", name, size);
        }
    }

    let w = &config.scoring;
    for (name, weight) in [
        ("scoring.stars", w.stars),
        ("scoring.followers", w.followers),
        ("scoring.contributions", w.contributions),
        ("scoring.activity", w.activity),
    ] {
        if !weight.is_finite() || weight < 0.0 {
            anyhow::bail!("{} must be a non-negative number", name);
        }
    }

    Ok(())
}
