//! Analysis pipeline and its progress stream.
//!
//! One analysis is a single producer task that walks the stages below and
//! pushes [`StreamRecord`]s into a channel. The caller consumes them through
//! [`AnalysisStream`], a finite, non-restartable `Stream`.
//!
//! ```text
//!  repo cache ──hit──────────────────────────────────────────▶ Result
//!      │miss
//!      ▼
//!  repo metadata (5) ─▶ stargazers (10) ─▶ forks (20) ─▶ dedupe (30)
//!                                                          │
//!      ┌───────────────────────────────────────────────────┘
//!      ▼
//!  batches (30..90) ─▶ complete (100) ─▶ repo cache write ─▶ Result
//! ```
//!
//! Any fatal error ends the stream with one `Error` record instead of a
//! `Result`. If the consumer drops the stream, the next report fails and the
//! task stops quietly: no error record, no repo cache write.

use futures::{FutureExt, Stream};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::cache::DurableCache;
use crate::candidates::dedupe_candidates;
use crate::config::Config;
use crate::enrich::Enricher;
use crate::error::{Disconnected, FetchError, GithubError};
use crate::fetcher::{RateLimitedFetcher, RetryPolicy};
use crate::github::GitHubApi;
use crate::models::{AnalysisResult, RepositoryTarget};
use crate::paginate::collect_all;
use crate::progress::{format_number, ChannelProgress, ProgressEvent, ProgressReporter, StreamRecord};
use crate::scheduler::BatchScheduler;
use crate::score::ScoreWeights;

/// Tunables for one pipeline, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub max_candidates: usize,
    pub concurrency: usize,
    pub batch_delay: Duration,
    pub repo_page_size: u32,
    pub event_page_size: u32,
    pub weights: ScoreWeights,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry.policy(),
            max_candidates: config.ranking.max_candidates,
            concurrency: config.ranking.concurrency,
            batch_delay: Duration::from_millis(config.ranking.batch_delay_ms),
            repo_page_size: config.ranking.repo_page_size,
            event_page_size: config.ranking.event_page_size,
            weights: config.scoring,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub target: RepositoryTarget,
    /// Skip the repo cache read. The result is still written back.
    pub refresh: bool,
}

/// Why a run ended without a result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("consumer disconnected")]
    Disconnected,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<Disconnected> for RunError {
    fn from(_: Disconnected) -> Self {
        RunError::Disconnected
    }
}

impl From<FetchError> for RunError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Disconnected(_) => RunError::Disconnected,
            other => RunError::Failed(other.into()),
        }
    }
}

/// The ranking pipeline for one upstream credential.
#[derive(Clone)]
pub struct Pipeline {
    api: Arc<dyn GitHubApi>,
    cache: DurableCache,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(api: Arc<dyn GitHubApi>, cache: DurableCache, settings: PipelineSettings) -> Self {
        Self {
            api,
            cache,
            settings,
        }
    }

    /// Spawns the analysis and returns its record stream.
    pub fn start(self, request: AnalysisRequest) -> AnalysisStream {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.drive(request, tx));
        AnalysisStream { rx }
    }

    async fn drive(self, request: AnalysisRequest, tx: UnboundedSender<StreamRecord>) {
        let progress: Arc<dyn ProgressReporter> = Arc::new(ChannelProgress::new(tx.clone()));

        let outcome = AssertUnwindSafe(self.run(&request, progress))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => {
                let _ = tx.send(StreamRecord::Result(result));
            }
            Ok(Err(RunError::Disconnected)) => {
                debug!(repo = %request.target, "consumer disconnected, analysis abandoned");
            }
            Ok(Err(RunError::Failed(e))) => {
                warn!(repo = %request.target, error = %format!("{:#}", e), "analysis failed");
                let _ = tx.send(StreamRecord::error(format!("{:#}", e)));
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!(repo = %request.target, panic = %message, "analysis panicked");
                let _ = tx.send(StreamRecord::error(format!("analysis aborted: {}", message)));
            }
        }
    }

    /// Runs the whole analysis, reporting progress as it goes.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<AnalysisResult, RunError> {
        let target = &request.target;

        if !request.refresh {
            match self.cache.repo_result(target).await {
                Ok(Some(cached)) => {
                    info!(repo = %target, "serving cached analysis");
                    progress.report(ProgressEvent::new("Loaded cached analysis", 100))?;
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!(repo = %target, error = %e, "repo cache read failed"),
            }
        }

        info!(repo = %target, "starting analysis");
        let fetcher = Arc::new(RateLimitedFetcher::new(
            self.settings.retry,
            progress.clone(),
        ));
        let api = &self.api;

        progress.report(ProgressEvent::new(
            format!("Fetching repository info for {}", target),
            5,
        ))?;
        let meta = fetcher
            .attempt(|| api.repository(target))
            .await
            .map_err(|e| match e {
                FetchError::Upstream(GithubError::NotFound(_)) => {
                    RunError::Failed(anyhow::anyhow!("Repository {} not found", target))
                }
                other => other.into(),
            })?;

        progress.report(ProgressEvent::new("Fetching stargazers", 10))?;
        let stargazers = collect_all(&fetcher, |page| api.stargazers(target, page)).await?;

        progress.report(ProgressEvent::new(
            format!(
                "Fetching forks ({} stargazers found)",
                format_number(stargazers.len() as u64)
            ),
            20,
        ))?;
        let forks = collect_all(&fetcher, |page| api.forks(target, page)).await?;

        let candidates = dedupe_candidates(
            stargazers.into_iter().map(|a| a.login),
            forks.into_iter().map(|f| f.owner.login),
            self.settings.max_candidates,
        );
        info!(repo = %target, candidates = candidates.len(), "candidate set built");
        progress.report(ProgressEvent::new(
            format!("Found {} unique users", format_number(candidates.len() as u64)),
            30,
        ))?;

        let enricher = Arc::new(Enricher::new(
            self.api.clone(),
            fetcher,
            self.cache.clone(),
            self.settings.weights,
            self.settings.repo_page_size,
            self.settings.event_page_size,
        ));
        let scheduler = BatchScheduler::new(
            enricher,
            self.settings.concurrency,
            self.settings.batch_delay,
        );
        let influencers = scheduler.rank(&candidates, progress.as_ref()).await?;

        progress.report(ProgressEvent::new("Analysis complete", 100))?;

        let result = AnalysisResult {
            repo_info: meta.into(),
            influencers,
        };
        if let Err(e) = self.cache.store_repo_result(target, &result).await {
            warn!(repo = %target, error = %e, "repo cache write failed");
        }

        Ok(result)
    }
}

/// Records of one analysis in emission order, ending with exactly one
/// terminal record.
pub struct AnalysisStream {
    rx: UnboundedReceiver<StreamRecord>,
}

impl AnalysisStream {
    pub async fn next_record(&mut self) -> Option<StreamRecord> {
        self.rx.recv().await
    }
}

impl Stream for AnalysisStream {
    type Item = StreamRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
