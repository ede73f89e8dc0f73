//! GitHub context acquisition for submitted pull requests and repositories.
//!
//! Resolves a submission URL into a [`SubmissionTarget`], pulls metadata,
//! file changes, commits and a handful of key files through the GitHub REST
//! API, and folds them into a [`bounty_core::GitHubContext`]. Every upstream
//! call runs under a [`RetryPolicy`] that understands GitHub rate limits.

pub mod client;
pub mod fetcher;
pub mod retry;
pub mod url;

pub use fetcher::{ContextSource, GitHubFetcher};
pub use retry::RetryPolicy;
pub use url::{parse_submission_url, SubmissionTarget};
