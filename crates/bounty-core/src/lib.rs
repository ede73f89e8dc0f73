//! Core types, configuration, and error handling for bounty-review.
//!
//! This crate provides the shared foundation used by all other crates:
//! - [`BountyError`]: unified error type using `thiserror`
//! - [`BountyConfig`]: configuration loaded from `.bounty-review.toml`
//! - Shared types: [`SubmissionRef`], [`GitHubContext`], [`ReviewContext`],
//!   [`ReviewResult`], [`ReviewOutcome`], [`ReviewStatus`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    BountyConfig, DatabaseConfig, GitHubConfig, LlmConfig, QueueConfig, ReviewConfig,
    ServerConfig, SweepConfig, DEFAULT_KEY_FILES,
};
pub use error::BountyError;
pub use types::{
    CommitInfo, FileChange, GitHubContext, KeyFile, OutputFormat, PrContext, RepoContext,
    ReviewContext, ReviewOutcome, ReviewResult, ReviewStatus, SubmissionRef,
};

/// A convenience `Result` type for bounty-review operations.
pub type Result<T> = std::result::Result<T, BountyError>;
