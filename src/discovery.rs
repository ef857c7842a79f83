//! Repository discovery over a paginated search API.
//!
//! Candidates come out ordered by stars, descending, then by `owner/name`. A
//! page only releases candidates strictly above the lowest star count it
//! contained; ties at that boundary wait for the next page so that equal star
//! counts sort by name across page boundaries.

use crate::config::MinerConfig;
use crate::error::DiscoveryError;
use crate::model::RepositoryCandidate;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

const FALLBACK_RATE_LIMIT_WAIT: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub language: String,
    pub minimum_stars: u64,
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl SearchQuery {
    pub fn from_config(config: &MinerConfig) -> Self {
        Self {
            language: config.language.clone(),
            minimum_stars: config.minimum_stars,
            since: config.since_date,
            until: config.until_date,
        }
    }

    pub fn to_query_string(&self) -> String {
        format!(
            "language:{} stars:>={} fork:false pushed:{}..{}",
            self.language,
            self.minimum_stars,
            self.since.format("%Y-%m-%d"),
            self.until.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: Option<u32>,
    pub reset_at: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<RepositoryCandidate>,
    pub next_page: Option<u32>,
    pub rate_limit: RateLimit,
}

pub trait SearchApi: Send + Sync {
    fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, DiscoveryError>;
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub max_retries: u32,
    pub max_wait_secs: u64,
    pub max_repos: usize,
}

impl DiscoveryOptions {
    pub fn from_config(config: &MinerConfig) -> Self {
        Self {
            max_retries: config.max_rate_limit_retries,
            max_wait_secs: config.max_rate_limit_wait_secs,
            max_repos: config.repo_budget(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryStats {
    pub pages: u32,
    pub retries: u32,
    pub rate_limit_waits: u32,
    pub duplicates: u32,
}

type Sleeper = Box<dyn Fn(Duration) + Send>;

pub struct Discovery<'a> {
    api: &'a dyn SearchApi,
    query: SearchQuery,
    options: DiscoveryOptions,
    next_page: Option<u32>,
    watermark: Option<u64>,
    buffer: VecDeque<RepositoryCandidate>,
    seen: HashSet<(String, String)>,
    yielded: usize,
    exhausted: bool,
    /// Reported once the buffered candidates have been released.
    failure: Option<DiscoveryError>,
    stats: DiscoveryStats,
    sleep: Sleeper,
}

impl<'a> Discovery<'a> {
    pub fn new(api: &'a dyn SearchApi, query: SearchQuery, options: DiscoveryOptions) -> Self {
        Self {
            api,
            query,
            options,
            next_page: Some(1),
            watermark: None,
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            yielded: 0,
            exhausted: false,
            failure: None,
            stats: DiscoveryStats::default(),
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the backoff sleep, e.g. to record waits instead of blocking.
    pub fn with_sleeper(mut self, sleep: impl Fn(Duration) + Send + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn stats(&self) -> &DiscoveryStats {
        &self.stats
    }

    fn releasable(&mut self) -> Option<RepositoryCandidate> {
        let front = self.buffer.front()?;
        let clear = match self.watermark {
            _ if self.exhausted => true,
            Some(mark) => front.stars > mark,
            None => false,
        };
        if clear { self.buffer.pop_front() } else { None }
    }

    fn fetch_next_page(&mut self) -> Result<(), DiscoveryError> {
        let Some(page) = self.next_page else {
            self.exhausted = true;
            return Ok(());
        };
        let result = self.search_with_retry(page)?;
        self.stats.pages += 1;
        tracing::debug!(page, items = result.items.len(), remaining = ?result.rate_limit.remaining, "search page");

        if let Some(lowest) = result.items.iter().map(|c| c.stars).min() {
            self.watermark = Some(lowest);
        }
        for candidate in result.items.iter() {
            if self.seen.insert(candidate.key()) {
                self.buffer.push_back(candidate.clone());
            } else {
                self.stats.duplicates += 1;
            }
        }
        self.buffer
            .make_contiguous()
            .sort_by(|a, b| b.stars.cmp(&a.stars).then_with(|| a.full_name().cmp(&b.full_name())));

        self.next_page = if result.items.is_empty() { None } else { result.next_page };
        if self.next_page.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }

    fn search_with_retry(&mut self, page: u32) -> Result<SearchPage, DiscoveryError> {
        let mut failures = 0u32;
        loop {
            match self.api.search(&self.query, page) {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() => {
                    failures += 1;
                    if failures > self.options.max_retries {
                        return Err(DiscoveryError::SourceUnavailable {
                            attempts: failures,
                            last: err.to_string(),
                        });
                    }
                    let wait = self.backoff(&err, failures);
                    if matches!(err, DiscoveryError::RateLimited { .. }) {
                        self.stats.rate_limit_waits += 1;
                    }
                    self.stats.retries += 1;
                    tracing::warn!(page, attempt = failures, wait_secs = wait.as_secs(), error = %err, "search retry");
                    (self.sleep)(wait);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff(&self, err: &DiscoveryError, attempt: u32) -> Duration {
        let secs = match err {
            DiscoveryError::RateLimited {
                reset_at: Some(reset),
            } => (reset - chrono::Utc::now().timestamp()).max(1) as u64,
            DiscoveryError::RateLimited { reset_at: None } => FALLBACK_RATE_LIMIT_WAIT,
            _ => 2u64.saturating_pow(attempt.min(16)),
        };
        Duration::from_secs(secs.min(self.options.max_wait_secs))
    }
}

impl Iterator for Discovery<'_> {
    type Item = Result<RepositoryCandidate, DiscoveryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.yielded >= self.options.max_repos {
                return None;
            }
            if let Some(candidate) = self.releasable() {
                self.yielded += 1;
                return Some(Ok(candidate));
            }
            if let Some(err) = self.failure.take() {
                return Some(Err(err));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_next_page() {
                self.exhausted = true;
                self.next_page = None;
                self.failure = Some(err);
            }
        }
    }
}
