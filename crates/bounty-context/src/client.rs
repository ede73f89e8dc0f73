use base64::Engine;
use bounty_core::{BountyError, GitHubConfig};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// GitHub caps pull request file listings at 3000 entries.
const MAX_PAGES: u32 = 30;
const PER_PAGE: u32 = 100;

/// Thin GitHub REST client that classifies failures for the retry policy.
///
/// `404` becomes [`BountyError::NotFound`], an exhausted quota becomes
/// [`BountyError::RateLimited`] carrying the reset time, and everything else
/// becomes [`BountyError::Upstream`].
///
/// # Examples
///
/// ```
/// use bounty_context::client::GitHubClient;
/// use bounty_core::GitHubConfig;
///
/// let client = GitHubClient::new(&GitHubConfig::default()).unwrap();
/// assert_eq!(client.api_base(), "https://api.github.com");
/// ```
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client from the `[github]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self, BountyError> {
        let http = reqwest::Client::builder()
            .user_agent("bounty-review")
            .build()
            .map_err(|e| BountyError::Config(format!("failed to create GitHub client: {e}")))?;

        if config.token.is_none() {
            warn!("GITHUB_TOKEN not set, using unauthenticated GitHub API access");
        }

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// REST API root this client talks to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// `GET /repos/{owner}/{repo}/pulls/{number}`
    pub async fn get_pull(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, BountyError> {
        self.get_json(&format!("/repos/{owner}/{repo}/pulls/{number}"), &[])
            .await
    }

    /// Every file changed by a pull request, across pages.
    pub async fn list_pull_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullFile>, BountyError> {
        self.get_paginated(&format!("/repos/{owner}/{repo}/pulls/{number}/files"))
            .await
    }

    /// Every commit of a pull request, across pages.
    pub async fn list_pull_commits(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<CommitEntry>, BountyError> {
        self.get_paginated(&format!("/repos/{owner}/{repo}/pulls/{number}/commits"))
            .await
    }

    /// `GET /repos/{owner}/{repo}`
    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<Repository, BountyError> {
        self.get_json(&format!("/repos/{owner}/{repo}"), &[]).await
    }

    /// The `limit` most recent commits on the default branch.
    pub async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: u32,
    ) -> Result<Vec<CommitEntry>, BountyError> {
        self.get_json(
            &format!("/repos/{owner}/{repo}/commits"),
            &[("per_page", limit.to_string())],
        )
        .await
    }

    /// Decoded text of a file on the default branch.
    ///
    /// Returns `Ok(None)` when the path does not exist or is not a regular
    /// file, so missing files do not go through the retry policy.
    pub async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<String>, BountyError> {
        let entry: serde_json::Value = match self
            .get_json(&format!("/repos/{owner}/{repo}/contents/{path}"), &[])
            .await
        {
            Ok(v) => v,
            Err(BountyError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if entry.get("type").and_then(|t| t.as_str()) != Some("file") {
            return Ok(None);
        }
        let Some(encoded) = entry.get("content").and_then(|c| c.as_str()) else {
            return Ok(None);
        };
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| BountyError::Upstream(format!("invalid base64 in {path}: {e}")))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn get_paginated<T: DeserializeOwned>(&self, route: &str) -> Result<Vec<T>, BountyError> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch: Vec<T> = self
                .get_json(
                    route,
                    &[
                        ("per_page", PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let last = batch.len() < PER_PAGE as usize;
            items.extend(batch);
            if last {
                break;
            }
        }
        Ok(items)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<T, BountyError> {
        let url = format!("{}{route}", self.api_base);
        debug!(%url, "GitHub request");

        let mut request = self
            .http
            .get(&url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BountyError::Upstream(format!("GitHub request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &headers, &body, route));
        }

        response
            .json()
            .await
            .map_err(|e| BountyError::Upstream(format!("failed to parse GitHub response: {e}")))
    }
}

/// Map a non-success GitHub response onto the error taxonomy.
///
/// A `403`/`429` with `x-ratelimit-remaining: 0` and a parseable
/// `x-ratelimit-reset` (epoch seconds) is a primary rate limit; a
/// `retry-after` header (seconds) marks a secondary one.
pub fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    route: &str,
) -> BountyError {
    if status == StatusCode::NOT_FOUND {
        return BountyError::NotFound(format!("{route} not found"));
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(reset_at) = rate_limit_reset(headers) {
            return BountyError::RateLimited {
                reset_at,
                message: body.to_string(),
            };
        }
    }

    BountyError::Upstream(format!("GitHub API error {status}: {body}"))
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header("x-ratelimit-remaining") == Some("0") {
        let reset: i64 = header("x-ratelimit-reset")?.trim().parse().ok()?;
        return DateTime::from_timestamp(reset, 0);
    }

    let after: i64 = header("retry-after")?.trim().parse().ok()?;
    Some(Utc::now() + chrono::Duration::seconds(after))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub user: Option<User>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullFile {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: Option<GitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitAuthor {
    pub name: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stargazers_count: u64,
    pub forks_count: u64,
    pub created_at: String,
    pub updated_at: String,
}
