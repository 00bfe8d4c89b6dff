//! GitHub REST access.
//!
//! The pipeline talks to GitHub only through the [`GitHubApi`] trait, so the
//! upstream can be swapped for a scripted fake in tests. [`HttpGitHubClient`]
//! is the production implementation on top of `reqwest`.
//!
//! # Rate-limit detection
//!
//! GitHub signals an exhausted budget in more than one way:
//! - HTTP 429 → always a rate limit
//! - HTTP 403 with `x-ratelimit-remaining: 0`, a `retry-after` header, or a
//!   body mentioning "rate limit" → primary or secondary rate limit
//! - any other 401/403 → rejected credential
//!
//! Only the first two map to [`GithubError::RateLimited`]; everything else is
//! returned as a distinct, non-retryable variant.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::GitHubConfig;
use crate::error::GithubError;
use crate::models::{
    Account, EventRecord, ForkRecord, Page, RepoMetadata, RepoRecord, RepositoryTarget,
    UserRecord,
};

/// The upstream operations the ranking pipeline needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn repository(&self, target: &RepositoryTarget) -> Result<RepoMetadata, GithubError>;

    async fn stargazers(
        &self,
        target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<Account>, GithubError>;

    async fn forks(
        &self,
        target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<ForkRecord>, GithubError>;

    async fn user(&self, login: &str) -> Result<UserRecord, GithubError>;

    /// First page of the user's own repositories, most-starred first
    /// (server-side star order, so the page is the top `per_page` by stars).
    async fn user_repos(&self, login: &str, per_page: u32) -> Result<Vec<RepoRecord>, GithubError>;

    /// First page of the user's public events.
    async fn user_events(&self, login: &str, per_page: u32)
        -> Result<Vec<EventRecord>, GithubError>;
}

/// `reqwest`-backed [`GitHubApi`] bound to one credential.
pub struct HttpGitHubClient {
    client: Client,
    api_url: Url,
    per_page: u32,
}

impl HttpGitHubClient {
    pub fn new(config: &GitHubConfig, token: Option<&str>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| anyhow::anyhow!("invalid github.user_agent: {}", e))?,
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| anyhow::anyhow!("invalid GitHub token value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_url = Url::parse(&config.api_url)
            .map_err(|e| anyhow::anyhow!("invalid github.api_url '{}': {}", config.api_url, e))?;
        if api_url.cannot_be_a_base() {
            anyhow::bail!("invalid github.api_url '{}'", config.api_url);
        }

        Ok(Self {
            client,
            api_url,
            per_page: config.per_page,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GithubError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| GithubError::Decode(format!("unusable API URL {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GETs `url` and decodes the body, returning the `rel="next"` page if any.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<(T, Option<u32>), GithubError> {
        debug!(%url, "GET");
        let resp = self.client.get(url.clone()).query(query).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(
                status.as_u16(),
                &headers,
                &body,
                url.path(),
            ));
        }

        let next_page = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_from_link);

        let bytes = resp.bytes().await?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| GithubError::Decode(format!("{}: {}", url.path(), e)))?;
        Ok((value, next_page))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: Url,
        page: u32,
    ) -> Result<Page<T>, GithubError> {
        let query = [
            ("per_page", self.per_page.to_string()),
            ("page", page.to_string()),
        ];
        let (items, next_page) = self.get_json::<Vec<T>>(url, &query).await?;
        Ok(Page { items, next_page })
    }
}

#[async_trait]
impl GitHubApi for HttpGitHubClient {
    async fn repository(&self, target: &RepositoryTarget) -> Result<RepoMetadata, GithubError> {
        let url = self.endpoint(&["repos", &target.owner, &target.name])?;
        let (meta, _) = self.get_json(url, &[]).await?;
        Ok(meta)
    }

    async fn stargazers(
        &self,
        target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<Account>, GithubError> {
        let url = self.endpoint(&["repos", &target.owner, &target.name, "stargazers"])?;
        self.get_page(url, page).await
    }

    async fn forks(
        &self,
        target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<ForkRecord>, GithubError> {
        let url = self.endpoint(&["repos", &target.owner, &target.name, "forks"])?;
        self.get_page(url, page).await
    }

    async fn user(&self, login: &str) -> Result<UserRecord, GithubError> {
        let url = self.endpoint(&["users", login])?;
        let (user, _) = self.get_json(url, &[]).await?;
        Ok(user)
    }

    async fn user_repos(&self, login: &str, per_page: u32) -> Result<Vec<RepoRecord>, GithubError> {
        // `/users/{login}/repos` cannot order by stars, so go through search.
        let url = self.endpoint(&["search", "repositories"])?;
        let query = [
            ("q", format!("user:{}", login)),
            ("sort", "stars".to_string()),
            ("order", "desc".to_string()),
            ("per_page", per_page.to_string()),
        ];
        let (found, _): (SearchResults<RepoRecord>, _) = self.get_json(url, &query).await?;
        Ok(found.items)
    }

    async fn user_events(
        &self,
        login: &str,
        per_page: u32,
    ) -> Result<Vec<EventRecord>, GithubError> {
        let url = self.endpoint(&["users", login, "events", "public"])?;
        let query = [("per_page", per_page.to_string())];
        let (events, _) = self.get_json(url, &query).await?;
        Ok(events)
    }
}

/// Envelope of the `/search/*` endpoints.
#[derive(Deserialize)]
struct SearchResults<T> {
    items: Vec<T>,
}

/// Maps a non-success response onto a [`GithubError`] variant.
fn classify_failure(status: u16, headers: &HeaderMap, body: &str, resource: &str) -> GithubError {
    let budget_spent = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    let retry_after = headers.contains_key("retry-after");
    let mentions_limit = body.to_ascii_lowercase().contains("rate limit");

    match status {
        429 => GithubError::RateLimited,
        403 if budget_spent || retry_after || mentions_limit => GithubError::RateLimited,
        401 | 403 => GithubError::Unauthorized { status },
        404 => GithubError::NotFound(resource.trim_start_matches('/').to_string()),
        _ => GithubError::Status {
            status,
            body: body.chars().take(500).collect(),
        },
    }
}

/// Extracts the page number of the `rel="next"` entry of a `Link` header.
fn next_page_from_link(header: &str) -> Option<u32> {
    header
        .split(',')
        .find(|part| part.contains("rel=\"next\""))
        .and_then(|part| {
            let start = part.find('<')? + 1;
            let end = part.find('>')?;
            Url::parse(part.get(start..end)?).ok()
        })
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
}
