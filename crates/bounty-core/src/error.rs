use chrono::{DateTime, Utc};

/// Errors that can occur across bounty-review.
///
/// The first six variants form the review error taxonomy: what the
/// fetcher may retry, what the generator persists as a failed outcome,
/// and what is fatal for a run. The rest wrap local plumbing failures.
/// Library crates use this type directly; it implements
/// [`miette::Diagnostic`] so the binary can attach help text at the boundary.
///
/// # Examples
///
/// ```
/// use bounty_core::BountyError;
///
/// let err = BountyError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum BountyError {
    /// The submission URL is neither a pull request nor a repository URL.
    #[error("invalid GitHub URL: {0}")]
    #[diagnostic(help(
        "expected https://github.com/<owner>/<repo> or https://github.com/<owner>/<repo>/pull/<number>"
    ))]
    InvalidReference(String),

    /// The pull request or repository does not exist or is private.
    #[error("{0}")]
    NotFound(String),

    /// The upstream API refused the call until `reset_at`.
    #[error("rate limited until {reset_at}: {message}")]
    RateLimited {
        /// When the upstream quota resets.
        reset_at: DateTime<Utc>,
        /// Upstream response detail.
        message: String,
    },

    /// Any other upstream failure (network, 5xx, unexpected payload).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("check .bounty-review.toml and the environment, or run 'bounty-review doctor'"))]
    Config(String),

    /// Reasoning-service call or response validation failure.
    ///
    /// Displays the bare message so that it can be persisted verbatim.
    #[error("{0}")]
    Generation(String),

    /// SQLite failure.
    #[error("database error: {0}")]
    Database(String),

    /// Job queue failure (bad payload, unknown job).
    #[error("queue error: {0}")]
    Queue(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BountyError {
    /// Whether running the same job again could plausibly succeed.
    ///
    /// Malformed input, missing targets and bad configuration are permanent;
    /// the queue fails such jobs without spending further attempts.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::InvalidReference(_)
                | Self::NotFound(_)
                | Self::Config(_)
                | Self::Serialization(_)
                | Self::Toml(_)
        )
    }

    /// Reset timestamp of a rate-limit failure, if this is one.
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_at, .. } => Some(*reset_at),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BountyError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = BountyError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn generation_error_displays_bare_message() {
        let err = BountyError::Generation("timeout".into());
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn transient_variants() {
        let reset = Utc::now();
        assert!(BountyError::Upstream("502".into()).is_transient());
        assert!(BountyError::Generation("timeout".into()).is_transient());
        assert!(BountyError::RateLimited {
            reset_at: reset,
            message: "quota".into()
        }
        .is_transient());
        assert!(!BountyError::NotFound("x".into()).is_transient());
        assert!(!BountyError::InvalidReference("x".into()).is_transient());
        assert!(!BountyError::Config("x".into()).is_transient());
    }

    #[test]
    fn rate_limit_reset_only_for_rate_limited() {
        let reset = Utc::now();
        let err = BountyError::RateLimited {
            reset_at: reset,
            message: "quota".into(),
        };
        assert_eq!(err.rate_limit_reset(), Some(reset));
        assert_eq!(BountyError::Upstream("x".into()).rate_limit_reset(), None);
    }
}
