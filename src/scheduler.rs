//! Batch scheduler.
//!
//! Enriches candidates in consecutive fixed-size groups. Workers inside a
//! group run concurrently; groups run strictly one after another with a pacing
//! delay in between. In-flight enrichments never exceed the group size.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::enrich::Enricher;
use crate::error::Disconnected;
use crate::models::InfluencerProfile;
use crate::progress::{format_number, ProgressEvent, ProgressReporter};

pub struct BatchScheduler {
    enricher: Arc<Enricher>,
    batch_size: usize,
    pacing: Duration,
}

impl BatchScheduler {
    pub fn new(enricher: Arc<Enricher>, batch_size: usize, pacing: Duration) -> Self {
        Self {
            enricher,
            batch_size: batch_size.max(1),
            pacing,
        }
    }

    /// Enriches every candidate and returns the profiles, highest score first.
    ///
    /// A progress event is reported before each group starts. If reporting
    /// fails the consumer has gone away and no further group is started.
    pub async fn rank(
        &self,
        candidates: &[String],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<InfluencerProfile>, Disconnected> {
        let total = candidates.len();
        let mut ranked = Vec::with_capacity(total);

        for (index, group) in candidates.chunks(self.batch_size).enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let start = index * self.batch_size;
            progress.report(ProgressEvent::new(
                format!(
                    "Analyzing users {}-{} of {}",
                    format_number((start + 1) as u64),
                    format_number((start + group.len()) as u64),
                    format_number(total as u64)
                ),
                batch_progress(start, total),
            ))?;

            let results = join_all(group.iter().map(|login| self.enricher.enrich(login))).await;
            let before = ranked.len();
            ranked.extend(results.into_iter().flatten());
            debug!(
                batch = index + 1,
                enriched = ranked.len() - before,
                requested = group.len(),
                "batch complete"
            );
        }

        info!(
            candidates = total,
            ranked = ranked.len(),
            "enrichment finished"
        );
        sort_by_score(&mut ranked);
        Ok(ranked)
    }
}

/// Progress for a batch starting at `start`: the 30..90 band, scaled by how
/// far through the candidate list the batch begins.
pub fn batch_progress(start: usize, total: usize) -> i32 {
    if total == 0 {
        return 30;
    }
    30 + ((start * 60) / total) as i32
}

/// Descending by score. Stable, so equal scores keep encounter order.
pub fn sort_by_score(profiles: &mut [InfluencerProfile]) {
    profiles.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DurableCache;
    use crate::fetcher::{RateLimitedFetcher, RetryPolicy};
    use crate::progress::NoProgress;
    use crate::score::ScoreWeights;
    use crate::testing::{FakeUser, RecordingProgress, ScriptedGitHub};

    fn scheduler(api: Arc<ScriptedGitHub>, batch_size: usize, pacing: Duration) -> BatchScheduler {
        let fetcher = Arc::new(RateLimitedFetcher::new(
            RetryPolicy::default(),
            Arc::new(NoProgress),
        ));
        let enricher = Enricher::new(
            api,
            fetcher,
            DurableCache::in_memory(Duration::from_secs(3600)),
            ScoreWeights::default(),
            100,
            100,
        );
        BatchScheduler::new(Arc::new(enricher), batch_size, pacing)
    }

    fn profile(login: &str, score: f64) -> InfluencerProfile {
        InfluencerProfile {
            login: login.into(),
            name: None,
            avatar_url: String::new(),
            bio: None,
            company: None,
            location: None,
            stars_earned: 0,
            followers: 0,
            following: 0,
            contributions: 0,
            recent_activity: 0,
            score,
        }
    }

    fn population(n: usize) -> (ScriptedGitHub, Vec<String>) {
        let mut api = ScriptedGitHub::new("r");
        let mut logins = Vec::new();
        for i in 0..n {
            let login = format!("user{}", i);
            api = api.user(
                &login,
                FakeUser {
                    followers: i as u64,
                    ..FakeUser::default()
                },
            );
            logins.push(login);
        }
        (api, logins)
    }

    #[test]
    fn progress_formula() {
        assert_eq!(batch_progress(0, 100), 30);
        assert_eq!(batch_progress(50, 100), 60);
        assert_eq!(batch_progress(99, 100), 89);
        assert_eq!(batch_progress(0, 0), 30);
    }

    #[test]
    fn ties_keep_encounter_order() {
        let mut v = vec![
            profile("a", 1.0),
            profile("b", 5.0),
            profile("c", 1.0),
            profile("d", 5.0),
        ];
        sort_by_score(&mut v);
        let order: Vec<_> = v.iter().map(|p| p.login.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_batch_size() {
        let (api, logins) = population(10);
        let api = Arc::new(api.user_latency(Duration::from_millis(50)));
        let s = scheduler(api.clone(), 3, Duration::from_secs(1));

        let ranked = s.rank(&logins, &NoProgress).await.unwrap();

        assert_eq!(ranked.len(), 10);
        assert_eq!(api.max_in_flight(), 3);
        assert_eq!(ranked[0].login, "user9");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test(start_paused = true)]
    async fn paces_between_batches_and_reports_each() {
        let (api, logins) = population(7);
        let s = scheduler(Arc::new(api), 3, Duration::from_secs(1));
        let progress = RecordingProgress::default();
        let start = tokio::time::Instant::now();

        s.rank(&logins, &progress).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(2));
        let events = progress.events();
        let values: Vec<i32> = events.iter().map(|e| e.progress).collect();
        assert_eq!(values, vec![30, 55, 81]);
        assert_eq!(events[2].status, "Analyzing users 7-7 of 7");
    }

    #[tokio::test]
    async fn failed_users_are_dropped() {
        let (api, mut logins) = population(3);
        logins.insert(1, "ghost-user".to_string());
        let s = scheduler(Arc::new(api), 30, Duration::ZERO);

        let ranked = s.rank(&logins, &NoProgress).await.unwrap();
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|p| p.login != "ghost-user"));
    }

    #[tokio::test]
    async fn stops_before_first_batch_when_disconnected() {
        let (api, logins) = population(4);
        let api = Arc::new(api);
        let s = scheduler(api.clone(), 2, Duration::ZERO);

        let err = s
            .rank(&logins, &RecordingProgress::disconnected())
            .await
            .unwrap_err();
        assert_eq!(err, Disconnected);
        assert_eq!(api.calls(), 0);
    }
}
