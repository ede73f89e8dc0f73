use async_trait::async_trait;
use bounty_core::{
    BountyError, CommitInfo, FileChange, GitHubConfig, GitHubContext, KeyFile, PrContext,
    RepoContext,
};
use tracing::{debug, info};

use crate::client::{CommitEntry, GitHubClient};
use crate::retry::RetryPolicy;
use crate::url::{parse_submission_url, SubmissionTarget};

/// Anything that can turn a submission URL into review context.
///
/// The pipeline holds this as a trait object so tests can substitute fakes.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Resolve `url` and gather its context.
    ///
    /// # Errors
    ///
    /// [`BountyError::InvalidReference`] for unrecognized URLs,
    /// [`BountyError::NotFound`] for missing or private targets, and
    /// [`BountyError::Upstream`] / [`BountyError::RateLimited`] once the
    /// retry budget is spent.
    async fn fetch(&self, url: &str) -> Result<GitHubContext, BountyError>;
}

/// Context fetcher backed by the GitHub REST API.
pub struct GitHubFetcher {
    client: GitHubClient,
    policy: RetryPolicy,
    key_files: Vec<String>,
    recent_commits: u32,
}

impl GitHubFetcher {
    /// Build a fetcher from the `[github]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Config`] if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use bounty_context::GitHubFetcher;
    /// use bounty_core::GitHubConfig;
    ///
    /// let fetcher = GitHubFetcher::new(&GitHubConfig::default()).unwrap();
    /// assert_eq!(fetcher.policy().max_attempts, 3);
    /// ```
    pub fn new(config: &GitHubConfig) -> Result<Self, BountyError> {
        Ok(Self {
            client: GitHubClient::new(config)?,
            policy: RetryPolicy::from_config(config),
            key_files: config.key_files.clone(),
            recent_commits: config.recent_commits,
        })
    }

    /// Retry policy applied to each upstream call.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn fetch_pr(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PrContext, BountyError> {
        let client = &self.client;
        let not_found = |e: BountyError| match e {
            BountyError::NotFound(_) => BountyError::NotFound(format!(
                "PR not found or is private: {owner}/{repo}#{number}"
            )),
            other => other,
        };

        let pr = self
            .policy
            .run("get pull request", move || client.get_pull(owner, repo, number))
            .await
            .map_err(not_found)?;
        let files = self
            .policy
            .run("list pull request files", move || {
                client.list_pull_files(owner, repo, number)
            })
            .await
            .map_err(not_found)?;
        let commits = self
            .policy
            .run("list pull request commits", move || {
                client.list_pull_commits(owner, repo, number)
            })
            .await
            .map_err(not_found)?;
        let key_files = self.fetch_key_files(owner, repo).await;

        Ok(PrContext {
            pr_number: number,
            title: pr.title,
            description: pr.body.unwrap_or_default(),
            state: pr.state,
            author: pr.user.map(|u| u.login).unwrap_or_default(),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            files: files
                .into_iter()
                .map(|f| FileChange {
                    filename: f.filename,
                    status: f.status,
                    additions: f.additions,
                    deletions: f.deletions,
                    patch: f.patch.unwrap_or_default(),
                })
                .collect(),
            commits: commits.into_iter().map(commit_info).collect(),
            key_files,
        })
    }

    async fn fetch_repo(&self, owner: &str, repo: &str) -> Result<RepoContext, BountyError> {
        let client = &self.client;
        let limit = self.recent_commits;
        let not_found = |e: BountyError| match e {
            BountyError::NotFound(_) => {
                BountyError::NotFound(format!("Repository not found or is private: {owner}/{repo}"))
            }
            other => other,
        };

        let data = self
            .policy
            .run("get repository", move || client.get_repo(owner, repo))
            .await
            .map_err(not_found)?;
        let key_files = self.fetch_key_files(owner, repo).await;
        let commits = self
            .policy
            .run("list commits", move || client.list_commits(owner, repo, limit))
            .await
            .map_err(not_found)?;

        Ok(RepoContext {
            name: data.name,
            description: data.description.unwrap_or_default(),
            language: data.language.unwrap_or_default(),
            stars: data.stargazers_count,
            forks: data.forks_count,
            created_at: data.created_at,
            updated_at: data.updated_at,
            key_files,
            recent_commits: commits.into_iter().map(commit_info).collect(),
        })
    }

    /// Read each configured key file independently; failures are skipped.
    async fn fetch_key_files(&self, owner: &str, repo: &str) -> Vec<KeyFile> {
        let client = &self.client;
        let mut found = Vec::new();
        for filename in &self.key_files {
            let path = filename.as_str();
            match self
                .policy
                .run("get key file", move || client.get_file_content(owner, repo, path))
                .await
            {
                Ok(Some(content)) => found.push(KeyFile {
                    filename: filename.clone(),
                    content,
                }),
                Ok(None) => debug!(owner, repo, file = path, "key file absent"),
                Err(e) => debug!(owner, repo, file = path, error = %e, "skipping key file"),
            }
        }
        found
    }
}

#[async_trait]
impl ContextSource for GitHubFetcher {
    async fn fetch(&self, url: &str) -> Result<GitHubContext, BountyError> {
        let target = parse_submission_url(url)?;
        let context = match &target {
            SubmissionTarget::PullRequest {
                owner,
                repo,
                number,
            } => GitHubContext::Pr(self.fetch_pr(owner, repo, *number).await?),
            SubmissionTarget::Repository { owner, repo } => {
                GitHubContext::Repo(self.fetch_repo(owner, repo).await?)
            }
        };
        info!(
            target = %target.slug(),
            kind = context.kind(),
            key_files = context.key_files().len(),
            "fetched GitHub context"
        );
        Ok(context)
    }
}

fn commit_info(entry: CommitEntry) -> CommitInfo {
    let (author, date) = entry
        .commit
        .author
        .map(|a| (a.name.unwrap_or_default(), a.date.unwrap_or_default()))
        .unwrap_or_default();
    CommitInfo {
        sha: entry.sha,
        message: entry.commit.message,
        author,
        date,
    }
}
