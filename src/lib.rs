//! # Stargazer Rank
//!
//! Ranks the users who starred or forked a GitHub repository by how
//! influential they are, streaming progress while the ranking is built.
//!
//! The heavy lifting is the ingestion pipeline: paginated, rate-limited
//! upstream fetches, a bounded and deduplicated candidate set, concurrent
//! per-user enrichment in paced batches, and a SQLite-backed cache with a
//! freshness window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  GitHub API │──▶│   Pipeline   │──▶│  SQLite  │
//! │ (GitHubApi) │   │ fetch+enrich │   │  cache   │
//! └─────────────┘   └──────┬───────┘   └──────────┘
//!                          │ StreamRecord
//!                ┌─────────┴─────────┐
//!                ▼                   ▼
//!           ┌──────────┐       ┌──────────┐
//!           │   CLI    │       │   HTTP   │
//!           │  (sgr)   │       │ (NDJSON) │
//!           └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sgr init                                        # create database
//! sgr analyze https://github.com/octocat/Hello-World
//! sgr cache stats
//! sgr serve                                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`github`] | Upstream trait and HTTP client |
//! | [`fetcher`] | Fixed-delay retry on rate limits |
//! | [`paginate`] | Page-by-page collection |
//! | [`cache`] | Durable cache with TTL |
//! | [`enrich`] | Per-user profile and metrics |
//! | [`scheduler`] | Paced batch enrichment |
//! | [`pipeline`] | End-to-end analysis and progress stream |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyze;
pub mod cache;
pub mod cache_cmd;
pub mod candidates;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod migrate;
pub mod models;
pub mod paginate;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod score;
pub mod server;

#[cfg(test)]
mod testing;
