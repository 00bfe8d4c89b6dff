//! The `sgr analyze` command.
//!
//! Runs the pipeline in-process against the configured cache database and
//! prints the ranking. Progress goes to stderr through the selected
//! [`ProgressMode`]; with `--json` every stream record is written to stdout
//! as NDJSON instead, exactly as the HTTP endpoint would send it.

use anyhow::{bail, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::debug;

use crate::cache::DurableCache;
use crate::config::Config;
use crate::db;
use crate::github::HttpGitHubClient;
use crate::models::{AnalysisResult, RepositoryTarget};
use crate::pipeline::{AnalysisRequest, Pipeline, PipelineSettings};
use crate::progress::{format_number, ProgressMode, StreamRecord};

pub struct AnalyzeOptions {
    pub url: String,
    pub token: Option<String>,
    pub refresh: bool,
    pub json: bool,
    pub limit: usize,
    pub progress: ProgressMode,
}

pub async fn run_analyze(config: &Config, opts: AnalyzeOptions) -> Result<()> {
    let target = RepositoryTarget::parse(&opts.url)?;
    let Some(token) = config.github.resolve_token(opts.token.as_deref()) else {
        bail!("A GitHub token is required: pass --token, set [github].token, or export GITHUB_TOKEN");
    };

    let pool = db::open(config).await?;
    let cache = DurableCache::sqlite(pool.clone(), config.cache.ttl());
    let api = Arc::new(HttpGitHubClient::new(&config.github, Some(&token))?);
    let pipeline = Pipeline::new(api, cache, PipelineSettings::from_config(config));

    let mut stream = pipeline.start(AnalysisRequest {
        target,
        refresh: opts.refresh,
    });
    let reporter = opts.progress.reporter();
    let stdout = io::stdout();

    let mut outcome = None;
    while let Some(record) = stream.next_record().await {
        if opts.json {
            let line = record.to_line()?;
            let mut out = stdout.lock();
            match out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("stdout closed, abandoning analysis");
                    drop(out);
                    drop(stream);
                    pool.close().await;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        match record {
            StreamRecord::Progress(event) => {
                if !opts.json {
                    // A local reporter never disconnects.
                    let _ = reporter.report(event);
                }
            }
            StreamRecord::Result(result) => outcome = Some(Ok(result)),
            StreamRecord::Error { error, .. } => outcome = Some(Err(error)),
        }
    }

    pool.close().await;

    match outcome {
        Some(Ok(result)) => {
            if !opts.json {
                ignore_closed_pipe(print_ranking(&mut stdout.lock(), &result, opts.limit))?;
            }
            Ok(())
        }
        Some(Err(error)) => bail!("{}", error),
        None => bail!("analysis ended without a result"),
    }
}

/// A reader closing stdout early (`sgr analyze ... | head`) ends output
/// without failing the command.
fn ignore_closed_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("stdout closed while printing ranking");
            Ok(())
        }
        other => other,
    }
}

fn print_ranking(out: &mut impl Write, result: &AnalysisResult, limit: usize) -> io::Result<()> {
    let repo = &result.repo_info;
    writeln!(out, "{}", repo.name)?;
    if let Some(desc) = repo.description.as_deref().filter(|d| !d.is_empty()) {
        writeln!(out, "  {}", desc)?;
    }
    writeln!(
        out,
        "  {} stars, {} forks, {} influencers ranked",
        format_number(repo.star_count),
        format_number(repo.fork_count),
        format_number(result.influencers.len() as u64)
    )?;
    writeln!(out)?;

    if result.influencers.is_empty() {
        writeln!(out, "No influencers found.")?;
        return Ok(());
    }

    writeln!(
        out,
        "  {:>4}  {:<28} {:>10} {:>10} {:>8} {:>6} {:>10}",
        "RANK", "LOGIN", "STARS", "FOLLOWERS", "CONTRIB", "EVENTS", "SCORE"
    )?;
    writeln!(out, "  {}", "-".repeat(84))?;

    for (i, p) in result.influencers.iter().take(limit).enumerate() {
        writeln!(
            out,
            "  {:>4}  {:<28} {:>10} {:>10} {:>8} {:>6} {:>10.1}",
            i + 1,
            truncate(&p.login, 28),
            format_number(p.stars_earned),
            format_number(p.followers),
            format_number(p.contributions),
            p.recent_activity,
            p.score
        )?;
    }

    if result.influencers.len() > limit {
        writeln!(out)?;
        writeln!(
            out,
            "  ... {} more (use --limit to show more)",
            result.influencers.len() - limit
        )?;
    }
    out.flush()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}
