//! Typed errors for the upstream seam.
//!
//! The pipeline has to tell a rate limit apart from every other failure, so
//! upstream calls return [`GithubError`] instead of `anyhow::Error`. The
//! fetcher wraps it in [`FetchError`] once its retry budget is involved.

use thiserror::Error;

/// Failure of a single upstream request.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The upstream refused the request because the rate-limit window is spent.
    #[error("GitHub API rate limit exceeded")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("GitHub credential rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("GitHub API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response from GitHub: {0}")]
    Decode(String),
}

impl GithubError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GithubError::RateLimited)
    }
}

/// Outcome of a call routed through the rate-limited fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Upstream(#[from] GithubError),

    #[error("rate limit retries exhausted after {retries} retries")]
    RetriesExhausted { retries: u32 },

    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

/// The consumer of a progress stream has gone away.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("progress consumer disconnected")]
pub struct Disconnected;
