//! User enrichment.
//!
//! Turns one candidate login into an [`InfluencerProfile`], either straight
//! from the user cache or from three concurrent upstream calls (profile,
//! first page of repositories, first page of public events).
//!
//! `starsEarned` and `recentActivity` only look at that first page. Users with
//! more repositories or events than one page holds are undercounted.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::DurableCache;
use crate::error::FetchError;
use crate::fetcher::RateLimitedFetcher;
use crate::github::GitHubApi;
use crate::models::{EventRecord, InfluencerProfile, RepoRecord, UserRecord};
use crate::score::{Metrics, ScoreWeights};

pub struct Enricher {
    api: Arc<dyn GitHubApi>,
    fetcher: Arc<RateLimitedFetcher>,
    cache: DurableCache,
    weights: ScoreWeights,
    repo_page_size: u32,
    event_page_size: u32,
}

impl Enricher {
    pub fn new(
        api: Arc<dyn GitHubApi>,
        fetcher: Arc<RateLimitedFetcher>,
        cache: DurableCache,
        weights: ScoreWeights,
        repo_page_size: u32,
        event_page_size: u32,
    ) -> Self {
        Self {
            api,
            fetcher,
            cache,
            weights,
            repo_page_size,
            event_page_size,
        }
    }

    /// Produces the profile for `login`, or `None` if it could not be fetched.
    ///
    /// Failures never propagate: a deleted account or an exhausted retry
    /// budget only drops this one user from the ranking.
    pub async fn enrich(&self, login: &str) -> Option<InfluencerProfile> {
        match self.cache.user_profile(login).await {
            Ok(Some(profile)) => {
                debug!(login, "user cache hit");
                return Some(profile);
            }
            Ok(None) => {}
            Err(e) => warn!(login, error = %e, "user cache read failed"),
        }

        let profile = match self.fetch(login).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(login, error = %e, "skipping user");
                return None;
            }
        };

        if let Err(e) = self.cache.store_user_profile(&profile).await {
            warn!(login, error = %e, "user cache write failed");
        }

        Some(profile)
    }

    async fn fetch(&self, login: &str) -> Result<InfluencerProfile, FetchError> {
        let api = &self.api;
        let (user, repos, events) = tokio::try_join!(
            self.fetcher.attempt(|| api.user(login)),
            self.fetcher
                .attempt(|| api.user_repos(login, self.repo_page_size)),
            self.fetcher
                .attempt(|| api.user_events(login, self.event_page_size)),
        )?;

        Ok(build_profile(user, &repos, &events, &self.weights))
    }
}

/// Derives the metrics and score for one user from the fetched pages.
pub fn build_profile(
    user: UserRecord,
    repos: &[RepoRecord],
    events: &[EventRecord],
    weights: &ScoreWeights,
) -> InfluencerProfile {
    let metrics = Metrics {
        stars_earned: repos
            .iter()
            .fold(0u64, |total, r| total.saturating_add(r.stargazers_count)),
        followers: user.followers,
        contributions: user.public_repos.saturating_add(user.public_gists),
        recent_activity: events.len() as u64,
    };

    InfluencerProfile {
        login: user.login,
        name: user.name,
        avatar_url: user.avatar_url,
        bio: user.bio,
        company: user.company,
        location: user.location,
        stars_earned: metrics.stars_earned,
        followers: metrics.followers,
        following: user.following,
        contributions: metrics.contributions,
        recent_activity: metrics.recent_activity,
        score: weights.score(&metrics),
    }
}
