//! Merged pull requests from the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use triage_core::{DataFetchPort, FetchedItem, PortError, PortResult, Source, TimeWindow};

use crate::config::{credential, GithubConfig};
use crate::error::{AdapterError, Result};

const USER_AGENT: &str = concat!("triage-adapters/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub merged_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct User {
    pub login: String,
}

/// Code-change source: pull requests merged into the base branch of each
/// target repository (`owner/name`).
pub struct GithubFetcher {
    http: reqwest::Client,
    api_url: String,
    token: String,
    base_branch: String,
    per_page: u32,
}

impl GithubFetcher {
    /// Build a fetcher, reading the token from `config.token_env`.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let token = credential(&config.token_env)?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &GithubConfig, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            base_branch: config.base_branch.clone(),
            per_page: config.per_page,
        })
    }

    fn pulls_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/pulls", self.api_url, repo)
    }

    /// One page of the most recently updated closed pull requests.
    async fn recent_pulls(&self, repo: &str) -> Result<Vec<PullRequest>> {
        let per_page = self.per_page.to_string();
        let response = self
            .http
            .get(self.pulls_url(repo))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .query(&[
                ("state", "closed"),
                ("base", self.base_branch.as_str()),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                service: "github",
                status,
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Pull requests merged inside `window`, newest update first.
///
/// `pulls` must be sorted by `updated_at` descending; the scan stops at the
/// first pull request last updated before the window opened, since nothing
/// after it can have been merged inside the window.
pub(crate) fn merged_within(
    repo: &str,
    pulls: Vec<PullRequest>,
    window: &TimeWindow,
) -> Vec<FetchedItem> {
    let mut items = Vec::new();
    for pr in pulls {
        if pr.updated_at < window.since {
            break;
        }
        let Some(merged_at) = pr.merged_at else {
            continue;
        };
        if !window.contains(merged_at) {
            continue;
        }
        let author = pr.user.map(|u| u.login).unwrap_or_else(|| "unknown".to_string());
        let body = pr.body.unwrap_or_default();
        let mut item = FetchedItem::new(
            Source::CodeChanges,
            format!("{repo}#{}", pr.number),
            pr.title,
            merged_at,
        )
        .with_summary(format!("by {author}: {}", body.trim()));
        item.url = pr.html_url;
        items.push(item);
    }
    items
}

#[async_trait]
impl DataFetchPort for GithubFetcher {
    async fn fetch(
        &self,
        targets: &[String],
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        let window = TimeWindow::ending_at(as_of, window_days);
        let pages = join_all(targets.iter().map(|repo| async move {
            (repo.as_str(), self.recent_pulls(repo).await)
        }))
        .await;

        let mut items = Vec::new();
        let mut last_error: Option<AdapterError> = None;
        let mut succeeded = 0usize;
        for (repo, page) in pages {
            match page {
                Ok(pulls) => {
                    succeeded += 1;
                    let merged = merged_within(repo, pulls, &window);
                    debug!(repo, merged = merged.len(), window_days, "fetched merged pull requests");
                    items.extend(merged);
                }
                Err(err) => {
                    warn!(repo, error = %err, "skipping repository");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if succeeded == 0 => Err(PortError::from(err)),
            _ => {
                items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(items)
            }
        }
    }
}
