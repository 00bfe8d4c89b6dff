//! HTTP front end.
//!
//! Exposes the ranking pipeline as a streaming JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/analyze` | Run an analysis, streaming newline-delimited JSON records |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request
//!
//! ```json
//! { "url": "https://github.com/octocat/Hello-World", "token": "ghp_…", "refresh": false }
//! ```
//!
//! `token` is optional when the server has its own credential configured
//! (`[github].token` or `GITHUB_TOKEN`).
//!
//! # Response stream
//!
//! `200 OK` with `content-type: application/x-ndjson`. Each line is one
//! record; the last one is either the result or an error record:
//!
//! ```text
//! {"status":"Fetching repository info for octocat/Hello-World","progress":5}
//! {"status":"Rate limit reached, waiting 15s before retrying (1/25)","progress":-1}
//! ...
//! {"repoInfo":{...},"influencers":[...]}
//! ```
//!
//! Once streaming has started, failures are reported in-band as
//! `{"status":"Error: …","progress":100,"error":"…"}`. Closing the connection
//! stops the analysis.
//!
//! # Error Contract
//!
//! Requests rejected before streaming starts get a JSON error body:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid repository URL 'x': ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end can
//! be served from anywhere.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::cache::DurableCache;
use crate::config::Config;
use crate::db;
use crate::github::{GitHubApi, HttpGitHubClient};
use crate::models::RepositoryTarget;
use crate::pipeline::{AnalysisRequest, Pipeline, PipelineSettings};

/// Builds the upstream client for one request's credential.
pub type ApiFactory =
    Arc<dyn Fn(&Config, &str) -> anyhow::Result<Arc<dyn GitHubApi>> + Send + Sync>;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: DurableCache,
    connect: ApiFactory,
}

impl AppState {
    /// State backed by the real GitHub API.
    pub fn new(config: Arc<Config>, cache: DurableCache) -> Self {
        Self::with_api_factory(
            config,
            cache,
            Arc::new(|config: &Config, token: &str| -> anyhow::Result<Arc<dyn GitHubApi>> {
                let client = HttpGitHubClient::new(&config.github, Some(token))?;
                Ok(Arc::new(client) as Arc<dyn GitHubApi>)
            }),
        )
    }

    pub fn with_api_factory(config: Arc<Config>, cache: DurableCache, connect: ApiFactory) -> Self {
        Self {
            config,
            cache,
            connect,
        }
    }
}

/// Starts the HTTP server.
///
/// Opens (and migrates) the cache database, binds to `[server].bind`, and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::open(config).await?;
    let cache = DurableCache::sqlite(pool, config.cache.ttl());
    let state = AppState::new(Arc::new(config.clone()), cache);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("stargazer-rank listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// The application router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(handle_analyze))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /api/analyze ============

#[derive(Deserialize)]
struct AnalyzeBody {
    url: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh: bool,
}

async fn handle_analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Response, AppError> {
    let target = RepositoryTarget::parse(&body.url).map_err(|e| bad_request(e.to_string()))?;
    let token = state
        .config
        .github
        .resolve_token(body.token.as_deref())
        .ok_or_else(|| {
            bad_request("A GitHub token is required (pass \"token\" or configure one on the server)")
        })?;
    let api = (state.connect)(&state.config, &token)
        .map_err(|e| internal(format!("failed to build GitHub client: {:#}", e)))?;

    info!(repo = %target, refresh = body.refresh, "analysis requested");

    let pipeline = Pipeline::new(
        api,
        state.cache.clone(),
        PipelineSettings::from_config(&state.config),
    );
    let stream = pipeline.start(AnalysisRequest {
        target,
        refresh: body.refresh,
    });

    let headers = [
        (header::CONTENT_TYPE, "application/x-ndjson"),
        (header::CACHE_CONTROL, "no-cache"),
    ];
    let body = Body::from_stream(stream.map(|record| record.to_line()));
    Ok((StatusCode::OK, headers, body).into_response())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
