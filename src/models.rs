//! Core data models used throughout Stargazer Rank.
//!
//! Two groups of types live here: the records the pipeline produces and
//! streams to callers ([`RepositorySummary`], [`InfluencerProfile`],
//! [`AnalysisResult`]) and the upstream response shapes the GitHub client
//! decodes ([`RepoMetadata`], [`Account`], [`UserRecord`], ...).

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The repository an analysis runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub owner: String,
    pub name: String,
}

impl RepositoryTarget {
    /// Parses `https://github.com/{owner}/{repo}` (trailing slash and `.git`
    /// tolerated) or a bare `owner/repo`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("repository URL must not be empty");
        }

        let segments: Vec<String> = if input.contains("://") {
            let url = reqwest::Url::parse(input)
                .map_err(|e| anyhow::anyhow!("invalid repository URL '{}': {}", input, e))?;
            url.path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
                .unwrap_or_default()
        } else {
            let path = input.strip_prefix("github.com/").unwrap_or(input);
            path.split('/')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        if segments.len() < 2 {
            bail!(
                "invalid repository URL '{}': expected .../{{owner}}/{{repo}}",
                input
            );
        }

        let owner = segments[0].clone();
        let name = segments[1]
            .strip_suffix(".git")
            .unwrap_or(&segments[1])
            .to_string();

        if owner.is_empty() || name.is_empty() {
            bail!("invalid repository URL '{}': owner and repo required", input);
        }

        Ok(Self { owner, name })
    }

    /// Key under which the full analysis is cached.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository metrics captured at analysis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySummary {
    pub name: String,
    pub description: Option<String>,
    pub star_count: u64,
    pub fork_count: u64,
}

/// One ranked candidate user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerProfile {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: String,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    /// Sum of stargazers over the first page of the user's repositories.
    pub stars_earned: u64,
    pub followers: u64,
    pub following: u64,
    /// Public repositories plus public gists.
    pub contributions: u64,
    /// Events on the first page of the user's public activity feed.
    pub recent_activity: u64,
    pub score: f64,
}

/// Terminal payload of a successful analysis; also the repo cache payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub repo_info: RepositorySummary,
    pub influencers: Vec<InfluencerProfile>,
}

// ============ Upstream shapes ============

/// `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Deserialize)]
pub struct RepoMetadata {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub description: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
}

impl From<RepoMetadata> for RepositorySummary {
    fn from(meta: RepoMetadata) -> Self {
        Self {
            name: meta.full_name.unwrap_or(meta.name),
            description: meta.description,
            star_count: meta.stargazers_count,
            fork_count: meta.forks_count,
        }
    }
}

/// A user reference as it appears in stargazer and fork listings.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

/// One entry of `GET /repos/{owner}/{repo}/forks`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForkRecord {
    pub owner: Account,
}

/// `GET /users/{login}`
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: String,
    pub bio: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub public_gists: u64,
}

/// One item of `GET /search/repositories?q=user:{login}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoRecord {
    pub name: String,
    #[serde(default)]
    pub stargazers_count: u64,
}

/// One entry of `GET /users/{login}/events/public`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// One page of a paginated listing.
///
/// `next_page` is the upstream's own continuation signal; `None` means the
/// listing is exhausted.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}
