//! Test doubles shared by the unit tests: a recording progress reporter and a
//! scripted in-process GitHub.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Disconnected, GithubError};
use crate::github::GitHubApi;
use crate::models::{
    Account, EventRecord, ForkRecord, Page, RepoMetadata, RepoRecord, RepositoryTarget,
    UserRecord,
};
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
    disconnected: bool,
}

impl RecordingProgress {
    pub fn disconnected() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            disconnected: true,
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) -> Result<(), Disconnected> {
        if self.disconnected {
            return Err(Disconnected);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Public activity of one scripted user.
#[derive(Clone, Debug, Default)]
pub struct FakeUser {
    pub followers: u64,
    pub following: u64,
    pub public_repos: u64,
    pub public_gists: u64,
    pub repo_stars: Vec<u64>,
    pub events: usize,
}

/// In-process GitHub driven by a fixed script.
///
/// Users not registered with [`ScriptedGitHub::user`] answer 404. Rate limits
/// are injected per request key (`"stargazers:2"`, `"user:alice"`, ...).
pub struct ScriptedGitHub {
    repo: Option<RepoMetadata>,
    stargazer_pages: Vec<Vec<String>>,
    fork_pages: Vec<Vec<String>>,
    users: HashMap<String, FakeUser>,
    rate_limits: Mutex<HashMap<String, u32>>,
    panics: HashSet<String>,
    user_latency: Duration,
    calls: AtomicUsize,
    user_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedGitHub {
    pub fn new(name: &str) -> Self {
        Self {
            repo: Some(RepoMetadata {
                name: name.to_string(),
                full_name: None,
                description: Some("scripted".to_string()),
                stargazers_count: 0,
                forks_count: 0,
            }),
            stargazer_pages: vec![vec![]],
            fork_pages: vec![vec![]],
            users: HashMap::new(),
            rate_limits: Mutex::new(HashMap::new()),
            panics: HashSet::new(),
            user_latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            user_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn missing_repo(mut self) -> Self {
        self.repo = None;
        self
    }

    pub fn stargazers(mut self, pages: &[&[&str]]) -> Self {
        self.stargazer_pages = to_pages(pages);
        if let Some(repo) = self.repo.as_mut() {
            repo.stargazers_count = self.stargazer_pages.iter().map(|p| p.len() as u64).sum();
        }
        self
    }

    pub fn forks(mut self, pages: &[&[&str]]) -> Self {
        self.fork_pages = to_pages(pages);
        if let Some(repo) = self.repo.as_mut() {
            repo.forks_count = self.fork_pages.iter().map(|p| p.len() as u64).sum();
        }
        self
    }

    pub fn user(mut self, login: &str, user: FakeUser) -> Self {
        self.users.insert(login.to_string(), user);
        self
    }

    /// Answers the next `times` requests for `key` with a rate limit.
    pub fn rate_limit(self, key: &str, times: u32) -> Self {
        self.rate_limits
            .lock()
            .unwrap()
            .insert(key.to_string(), times);
        self
    }

    /// Makes the request with this key panic instead of answering.
    pub fn panic_on(mut self, key: &str) -> Self {
        self.panics.insert(key.to_string());
        self
    }

    pub fn user_latency(mut self, latency: Duration) -> Self {
        self.user_latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, key: &str) -> Result<(), GithubError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics.contains(key) {
            panic!("scripted panic on {}", key);
        }
        let mut limits = self.rate_limits.lock().unwrap();
        if let Some(remaining) = limits.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GithubError::RateLimited);
            }
        }
        Ok(())
    }

    fn page_of(pages: &[Vec<String>], page: u32) -> Page<String> {
        let index = page.saturating_sub(1) as usize;
        Page {
            items: pages.get(index).cloned().unwrap_or_default(),
            next_page: (index + 1 < pages.len()).then_some(page + 1),
        }
    }

    fn known(&self, login: &str) -> Result<&FakeUser, GithubError> {
        self.users
            .get(login)
            .ok_or_else(|| GithubError::NotFound(format!("users/{}", login)))
    }
}

fn to_pages(pages: &[&[&str]]) -> Vec<Vec<String>> {
    pages
        .iter()
        .map(|p| p.iter().map(|s| s.to_string()).collect())
        .collect()
}

#[async_trait]
impl GitHubApi for ScriptedGitHub {
    async fn repository(&self, target: &RepositoryTarget) -> Result<RepoMetadata, GithubError> {
        self.enter("repository")?;
        self.repo
            .clone()
            .ok_or_else(|| GithubError::NotFound(format!("repos/{}", target)))
    }

    async fn stargazers(
        &self,
        _target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<Account>, GithubError> {
        self.enter(&format!("stargazers:{}", page))?;
        let p = Self::page_of(&self.stargazer_pages, page);
        Ok(Page {
            items: p.items.into_iter().map(|login| Account { login }).collect(),
            next_page: p.next_page,
        })
    }

    async fn forks(
        &self,
        _target: &RepositoryTarget,
        page: u32,
    ) -> Result<Page<ForkRecord>, GithubError> {
        self.enter(&format!("forks:{}", page))?;
        let p = Self::page_of(&self.fork_pages, page);
        Ok(Page {
            items: p
                .items
                .into_iter()
                .map(|login| ForkRecord {
                    owner: Account { login },
                })
                .collect(),
            next_page: p.next_page,
        })
    }

    async fn user(&self, login: &str) -> Result<UserRecord, GithubError> {
        self.enter(&format!("user:{}", login))?;
        self.user_calls.fetch_add(1, Ordering::SeqCst);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.user_latency.is_zero() {
            tokio::time::sleep(self.user_latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let user = self.known(login)?;
        Ok(UserRecord {
            login: login.to_string(),
            name: Some(login.to_uppercase()),
            avatar_url: format!("https://avatars.example/{}", login),
            bio: None,
            company: None,
            location: None,
            followers: user.followers,
            following: user.following,
            public_repos: user.public_repos,
            public_gists: user.public_gists,
        })
    }

    async fn user_repos(&self, login: &str, per_page: u32) -> Result<Vec<RepoRecord>, GithubError> {
        self.enter(&format!("repos:{}", login))?;
        let user = self.known(login)?;
        let mut stars = user.repo_stars.clone();
        stars.sort_unstable_by(|a, b| b.cmp(a));
        Ok(stars
            .into_iter()
            .take(per_page as usize)
            .enumerate()
            .map(|(i, s)| RepoRecord {
                name: format!("repo-{}", i),
                stargazers_count: s,
            })
            .collect())
    }

    async fn user_events(
        &self,
        login: &str,
        per_page: u32,
    ) -> Result<Vec<EventRecord>, GithubError> {
        self.enter(&format!("events:{}", login))?;
        let user = self.known(login)?;
        Ok((0..user.events.min(per_page as usize))
            .map(|i| EventRecord {
                id: i.to_string(),
                kind: Some("PushEvent".to_string()),
            })
            .collect())
    }
}
