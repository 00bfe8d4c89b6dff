use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

use stargazer_rank::cache::DurableCache;
use stargazer_rank::models::{
    AnalysisResult, InfluencerProfile, RepositorySummary, RepositoryTarget,
};

fn sgr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sgr");
    path
}

fn setup_test_env_with(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/sgr.sqlite"

[github]
api_url = "http://127.0.0.1:9"
timeout_secs = 2

[cache]
ttl_secs = 3600

[server]
bind = "127.0.0.1:7341"
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("sgr.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_test_env_with("")
}

fn run_sgr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sgr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sgr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn hello_world_result() -> AnalysisResult {
    let profile = |login: &str, followers: u64, score: f64| InfluencerProfile {
        login: login.to_string(),
        name: None,
        avatar_url: format!("https://avatars.example/{}", login),
        bio: None,
        company: None,
        location: None,
        stars_earned: 0,
        followers,
        following: 0,
        contributions: 0,
        recent_activity: 0,
        score,
    };

    AnalysisResult {
        repo_info: RepositorySummary {
            name: "octocat/Hello-World".to_string(),
            description: Some("My first repository on GitHub!".to_string()),
            star_count: 3,
            fork_count: 1,
        },
        influencers: vec![
            profile("bob", 100, 200.0),
            profile("carol", 40, 80.0),
            profile("alice", 10, 20.0),
        ],
    }
}

async fn seed_repo_cache(config_path: &Path) {
    let cfg = stargazer_rank::config::load_config(config_path).unwrap();
    let pool = stargazer_rank::db::open(&cfg).await.unwrap();
    let cache = DurableCache::sqlite(pool.clone(), cfg.cache.ttl());
    let target = RepositoryTarget::parse("octocat/Hello-World").unwrap();
    cache
        .store_repo_result(&target, &hello_world_result())
        .await
        .unwrap();
    pool.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sgr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/sgr.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sgr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sgr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_errors() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_sgr(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env_with("\n[ranking]\nconcurrency = 0\n");
    let (_, stderr, success) = run_sgr(&config_path, &["init"]);
    assert!(!success, "zero concurrency should be rejected");
    assert!(stderr.contains("concurrency"));
}

#[test]
fn test_cache_stats_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_sgr(&config_path, &["init"]);
    let (stdout, stderr, success) = run_sgr(&config_path, &["cache", "stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("repo"));
    assert!(stdout.contains("user"));
    assert!(stdout.contains("TTL:         3600s"));
}

#[test]
fn test_cache_clear_unknown_scope() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sgr(&config_path, &["cache", "clear", "everything"]);
    assert!(!success);
    assert!(stderr.contains("unknown cache scope"));
}

#[test]
fn test_analyze_invalid_url() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sgr(
        &config_path,
        &["analyze", "https://gitlab.com/", "--token", "t"],
    );
    assert!(!success, "invalid URL should fail");
    assert!(stderr.contains("invalid repository URL"), "stderr={}", stderr);
}

#[test]
fn test_analyze_requires_token() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sgr(&config_path, &["analyze", "octocat/Hello-World"]);
    assert!(!success, "missing token should fail");
    assert!(stderr.contains("token"), "stderr={}", stderr);
}

#[tokio::test]
async fn test_analyze_serves_fresh_cache_offline() {
    let (_tmp, config_path) = setup_test_env();
    seed_repo_cache(&config_path).await;

    // The configured API URL is unreachable, so this only succeeds from cache.
    let (stdout, stderr, success) = run_sgr(
        &config_path,
        &[
            "analyze",
            "https://github.com/octocat/Hello-World",
            "--token",
            "t",
            "--progress",
            "off",
        ],
    );
    assert!(success, "analyze failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("octocat/Hello-World"));

    let bob = stdout.find("bob").unwrap();
    let carol = stdout.find("carol").unwrap();
    let alice = stdout.find("alice").unwrap();
    assert!(bob < carol && carol < alice, "ranking out of order:\n{}", stdout);
}

#[tokio::test]
async fn test_analyze_json_stream_ends_with_result() {
    let (_tmp, config_path) = setup_test_env();
    seed_repo_cache(&config_path).await;

    let (stdout, stderr, success) = run_sgr(
        &config_path,
        &["analyze", "octocat/Hello-World", "--token", "t", "--json"],
    );
    assert!(success, "analyze failed: stderr={}", stderr);

    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["status"], "Loaded cached analysis");
    assert_eq!(lines[0]["progress"], 100);
    assert_eq!(lines[1]["repoInfo"]["starCount"], 3);
    assert_eq!(lines[1]["influencers"][0]["login"], "bob");
}

#[tokio::test]
async fn test_cache_clear_repo_forces_upstream() {
    let (_tmp, config_path) = setup_test_env();
    seed_repo_cache(&config_path).await;

    let (stdout, _, success) = run_sgr(&config_path, &["cache", "clear", "repo"]);
    assert!(success);
    assert!(stdout.contains("Cleared 1 repo cache entries."));

    // Without the cached analysis the unreachable upstream is hit and fails.
    let (_, _, success) = run_sgr(
        &config_path,
        &["analyze", "octocat/Hello-World", "--token", "t", "--progress", "off"],
    );
    assert!(!success);
}

#[tokio::test]
async fn test_analyze_json_tolerates_closed_stdout() {
    let (_tmp, config_path) = setup_test_env();
    seed_repo_cache(&config_path).await;

    let mut child = Command::new(sgr_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["analyze", "octocat/Hello-World", "--token", "t", "--json"])
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Like `sgr analyze --json | head -0`: the reader goes away before any output.
    drop(child.stdout.take());

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr={}", stderr);
    assert!(!stderr.contains("Broken pipe"), "stderr={}", stderr);
}
