use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one reviewable unit: a submission made against a bounty.
///
/// The pair is the natural key of every downstream record and is never
/// mutated once a pipeline run starts.
///
/// # Examples
///
/// ```
/// use bounty_core::SubmissionRef;
///
/// let sub = SubmissionRef::new("https://github.com/o/r/pull/7", "B1");
/// assert_eq!(sub.bounty_id, "B1");
/// let json = serde_json::to_value(&sub).unwrap();
/// assert_eq!(json["submissionUrl"], "https://github.com/o/r/pull/7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRef {
    /// Pull request or repository URL.
    pub submission_url: String,
    /// Bounty the submission was made against.
    pub bounty_id: String,
}

impl SubmissionRef {
    /// Build a reference from its two parts.
    pub fn new(submission_url: impl Into<String>, bounty_id: impl Into<String>) -> Self {
        Self {
            submission_url: submission_url.into(),
            bounty_id: bounty_id.into(),
        }
    }
}

impl fmt::Display for SubmissionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (bounty {})", self.submission_url, self.bounty_id)
    }
}

/// One file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub filename: String,
    /// `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    /// Unified patch; empty for binary or oversized files.
    #[serde(default)]
    pub patch: String,
}

/// A commit as shown to the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
}

/// A small, fixed-name repository file fetched for project context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub filename: String,
    pub content: String,
}

/// Context gathered for a pull request submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrContext {
    pub pr_number: u64,
    pub title: String,
    pub description: String,
    pub state: String,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
    pub files: Vec<FileChange>,
    pub commits: Vec<CommitInfo>,
    pub key_files: Vec<KeyFile>,
}

/// Context gathered for a whole-repository submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoContext {
    pub name: String,
    pub description: String,
    pub language: String,
    pub stars: u64,
    pub forks: u64,
    pub created_at: String,
    pub updated_at: String,
    pub key_files: Vec<KeyFile>,
    pub recent_commits: Vec<CommitInfo>,
}

/// Normalized GitHub context for a submission.
///
/// The variant is decided solely by the URL shape: a `/pull/<n>` segment
/// selects [`GitHubContext::Pr`], anything else [`GitHubContext::Repo`].
/// Serialized with a `type` tag of `"pr"` or `"repo"`.
///
/// # Examples
///
/// ```
/// use bounty_core::{GitHubContext, RepoContext};
///
/// let ctx = GitHubContext::Repo(RepoContext {
///     name: "r".into(),
///     description: String::new(),
///     language: "Rust".into(),
///     stars: 1,
///     forks: 0,
///     created_at: String::new(),
///     updated_at: String::new(),
///     key_files: vec![],
///     recent_commits: vec![],
/// });
/// let json = serde_json::to_value(&ctx).unwrap();
/// assert_eq!(json["type"], "repo");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GitHubContext {
    /// A single pull request.
    Pr(PrContext),
    /// A repository as a whole.
    Repo(RepoContext),
}

impl GitHubContext {
    /// Key files collected for either variant.
    pub fn key_files(&self) -> &[KeyFile] {
        match self {
            GitHubContext::Pr(pr) => &pr.key_files,
            GitHubContext::Repo(repo) => &repo.key_files,
        }
    }

    /// Short variant name (`pr` or `repo`), used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GitHubContext::Pr(_) => "pr",
            GitHubContext::Repo(_) => "repo",
        }
    }
}

/// Everything the review stage needs, carried between the two stages.
///
/// Never persisted on its own; it only travels inside a review job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContext {
    pub github_context: GitHubContext,
    pub bounty_requirements: String,
    #[serde(flatten)]
    pub submission: SubmissionRef,
}

/// What the reasoning service produced for a submission.
///
/// # Examples
///
/// ```
/// use bounty_core::ReviewResult;
///
/// let result = ReviewResult {
///     score: 82.0,
///     notes: "Solid implementation".into(),
///     labels: vec!["meets-criteria".into()],
/// };
/// assert!(result.labels.contains(&"meets-criteria".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// 0 to 100.
    pub score: f64,
    pub notes: String,
    /// Ordered, without duplicates.
    pub labels: Vec<String>,
}

/// Lifecycle status of a stored outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewStatus::Pending => write!(f, "pending"),
            ReviewStatus::Completed => write!(f, "completed"),
            ReviewStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "completed" => Ok(ReviewStatus::Completed),
            "failed" => Ok(ReviewStatus::Failed),
            other => Err(format!("unknown review status: {other}")),
        }
    }
}

/// The persisted record of a review, one per [`SubmissionRef`].
///
/// Saving is last-write-wins. `created_at` is kept from the first write of
/// a given ref; `updated_at` moves on every write.
///
/// # Examples
///
/// ```
/// use bounty_core::{ReviewOutcome, ReviewStatus, SubmissionRef};
///
/// let sub = SubmissionRef::new("https://github.com/o/r", "B1");
/// let outcome = ReviewOutcome::failed(sub, "timeout");
/// assert_eq!(outcome.status, ReviewStatus::Failed);
/// assert!(outcome.score.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    #[serde(flatten)]
    pub submission: SubmissionRef,
    pub score: Option<f64>,
    pub notes: Option<String>,
    pub labels: Option<Vec<String>>,
    pub status: ReviewStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewOutcome {
    /// A successful review.
    pub fn completed(submission: SubmissionRef, result: ReviewResult) -> Self {
        let now = Utc::now();
        Self {
            submission,
            score: Some(result.score),
            notes: Some(result.notes),
            labels: Some(result.labels),
            status: ReviewStatus::Completed,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A failed review carrying a human-readable error.
    pub fn failed(submission: SubmissionRef, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            submission,
            score: None,
            notes: None,
            labels: None,
            status: ReviewStatus::Failed,
            error: Some(error.into()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Render the outcome as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Review Outcome\n\n");
        out.push_str(&format!(
            "**Submission:** {} | **Bounty:** {} | **Status:** {}\n\n",
            self.submission.submission_url, self.submission.bounty_id, self.status
        ));
        if let Some(score) = self.score {
            out.push_str(&format!("**Score:** {score:.0}/100\n\n"));
        }
        if let Some(notes) = &self.notes {
            out.push_str(&format!("{notes}\n\n"));
        }
        if let Some(labels) = self.labels.as_ref().filter(|l| !l.is_empty()) {
            let labels: Vec<String> = labels.iter().map(|l| format!("`{l}`")).collect();
            out.push_str(&format!("**Labels:** {}\n\n", labels.join(", ")));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("> **Error:** {error}\n\n"));
        }
        out
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Submission: {}", self.submission)?;
        writeln!(f, "Status:     {}", self.status)?;
        if let Some(score) = self.score {
            writeln!(f, "Score:      {score:.0}/100")?;
        }
        if let Some(labels) = &self.labels {
            writeln!(f, "Labels:     {}", labels.join(", "))?;
        }
        if let Some(notes) = &self.notes {
            writeln!(f, "\n{notes}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:      {error}")?;
        }
        writeln!(f, "Updated:    {}", self.updated_at.to_rfc3339())
    }
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use bounty_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
