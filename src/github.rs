use crate::config::MinerConfig;
use crate::discovery::{RateLimit, SearchApi, SearchPage, SearchQuery};
use crate::error::DiscoveryError;
use crate::fetcher::LicenseLookup;
use crate::model::RepositoryCandidate;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;

const PER_PAGE: u32 = 100;
/// The search endpoint never serves results past this offset.
const SEARCH_RESULT_CAP: u64 = 1000;

#[derive(Deserialize)]
struct SearchResponse {
    total_count: u64,
    items: Vec<RepoItem>,
}

#[derive(Deserialize)]
struct RepoItem {
    name: String,
    owner: OwnerItem,
    html_url: String,
    clone_url: String,
    stargazers_count: u64,
    pushed_at: Option<DateTime<Utc>>,
    default_branch: Option<String>,
    license: Option<LicenseItem>,
}

#[derive(Deserialize)]
struct OwnerItem {
    login: String,
}

#[derive(Deserialize)]
struct LicenseItem {
    key: String,
}

#[derive(Deserialize)]
struct LicenseResponse {
    license: Option<LicenseItem>,
}

impl From<RepoItem> for RepositoryCandidate {
    fn from(item: RepoItem) -> Self {
        RepositoryCandidate {
            owner: item.owner.login,
            name: item.name,
            html_url: item.html_url,
            clone_url: item.clone_url,
            stars: item.stargazers_count,
            pushed_at: item.pushed_at,
            default_branch: item.default_branch,
            license_key: item.license.map(|l| l.key),
        }
    }
}

/// Blocking client for the GitHub REST API.
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, DiscoveryError> {
        let http = Client::builder()
            .user_agent(concat!("methodmine/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        if token.is_none() {
            tracing::warn!("GITHUB_TOKEN not set; search requests use the anonymous rate limit");
        }
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &MinerConfig) -> Result<Self, DiscoveryError> {
        Self::new(&config.api_base_url, config.github_token.clone())
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response, DiscoveryError> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))
    }
}

impl SearchApi for GitHubClient {
    fn search(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, DiscoveryError> {
        let response = self.get(
            "/search/repositories",
            &[
                ("q", query.to_query_string()),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ],
        )?;
        let rate_limit = read_rate_limit(response.headers());
        let response = check_status(response, rate_limit)?;
        let body: SearchResponse = response
            .json()
            .map_err(|err| DiscoveryError::Decode(err.to_string()))?;

        let served = u64::from(page) * u64::from(PER_PAGE);
        let next_page = if body.items.len() as u32 == PER_PAGE
            && served < body.total_count.min(SEARCH_RESULT_CAP)
        {
            Some(page + 1)
        } else {
            None
        };
        Ok(SearchPage {
            items: body.items.into_iter().map(RepositoryCandidate::from).collect(),
            next_page,
            rate_limit,
        })
    }
}

impl LicenseLookup for GitHubClient {
    fn license(&self, owner: &str, name: &str) -> Result<Option<String>, DiscoveryError> {
        let response = self.get(&format!("/repos/{owner}/{name}/license"), &[])?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let rate_limit = read_rate_limit(response.headers());
        let response = check_status(response, rate_limit)?;
        let body: LicenseResponse = response
            .json()
            .map_err(|err| DiscoveryError::Decode(err.to_string()))?;
        Ok(body.license.map(|l| l.key))
    }
}

fn check_status(response: Response, rate_limit: RateLimit) -> Result<Response, DiscoveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = header_number::<i64>(response.headers(), "retry-after");
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (rate_limit.remaining == Some(0) || retry_after.is_some()));
    if limited {
        let reset_at = retry_after
            .map(|secs| Utc::now().timestamp() + secs)
            .or(rate_limit.reset_at);
        return Err(DiscoveryError::RateLimited { reset_at });
    }
    let message = response.text().unwrap_or_default();
    Err(DiscoveryError::Http {
        status: status.as_u16(),
        message: message.chars().take(200).collect(),
    })
}

pub fn read_rate_limit(headers: &HeaderMap) -> RateLimit {
    RateLimit {
        remaining: header_number(headers, "x-ratelimit-remaining"),
        reset_at: header_number(headers, "x-ratelimit-reset"),
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
