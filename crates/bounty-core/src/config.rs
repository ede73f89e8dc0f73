use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BountyError;

/// Files read opportunistically from the submitted repository.
pub const DEFAULT_KEY_FILES: [&str; 5] = [
    "README.md",
    "package.json",
    "tsconfig.json",
    "Dockerfile",
    ".env.example",
];

/// Top-level configuration loaded from `.bounty-review.toml`.
///
/// Supports layered resolution: CLI flags > env vars > config file > defaults.
///
/// # Examples
///
/// ```
/// use bounty_core::BountyConfig;
///
/// let config = BountyConfig::default();
/// assert_eq!(config.github.max_attempts, 3);
/// assert_eq!(config.sweep.batch_size, 100);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BountyConfig {
    /// GitHub API access and retry settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Reasoning-service settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Prompt size limits.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Where outcomes, submissions and jobs are stored.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Worker pool and queue-level retry.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Periodic discovery of overdue submissions.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// HTTP intake.
    #[serde(default)]
    pub server: ServerConfig,
}

impl BountyConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Io`] if the file cannot be read, or
    /// [`BountyError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, BountyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use bounty_core::BountyConfig;
    ///
    /// let toml = r#"
    /// [queue]
    /// review_workers = 8
    /// "#;
    /// let config = BountyConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.queue.review_workers, 8);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, BountyError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load `path` if given, else `.bounty-review.toml` when present, else
    /// defaults; then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit or discovered file cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, BountyError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(".bounty-review.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from environment variables.
    ///
    /// `lookup` abstracts `std::env::var` so tests need not mutate the
    /// process environment. Empty values are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use bounty_core::BountyConfig;
    ///
    /// let mut config = BountyConfig::default();
    /// config.apply_env(|k| (k == "GITHUB_TOKEN").then(|| "ghp_x".to_string()));
    /// assert_eq!(config.github.token.as_deref(), Some("ghp_x"));
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(key) = get(self.llm.api_key_env()) {
            self.llm.api_key = Some(key);
        }
        if let Some(path) = get("BOUNTY_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

/// GitHub API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Anonymous access is allowed but heavily rate limited.
    pub token: Option<String>,
    /// REST API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Attempts per upstream call, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base of the exponential backoff in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Repository files read for project context.
    #[serde(default = "default_key_files")]
    pub key_files: Vec<String>,
    /// Commits fetched for a repository submission (default: 10).
    #[serde(default = "default_recent_commits")]
    pub recent_commits: u32,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_key_files() -> Vec<String> {
    DEFAULT_KEY_FILES.iter().map(|s| s.to_string()).collect()
}

fn default_recent_commits() -> u32 {
    10
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            key_files: default_key_files(),
            recent_commits: default_recent_commits(),
        }
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use bounty_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4-turbo-preview");
/// assert!(config.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name, used to pick the API key variable.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4-turbo-preview".into()
}

fn default_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    /// Environment variable holding the API key for the configured provider.
    pub fn api_key_env(&self) -> &'static str {
        match self.provider.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            "gemini" => "GEMINI_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Limits applied while assembling the review prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// File-change summaries listed for a pull request (default: 20).
    #[serde(default = "default_max_file_changes")]
    pub max_file_changes: usize,
    /// Commit messages listed for a pull request (default: 10).
    #[serde(default = "default_max_commit_messages")]
    pub max_commit_messages: usize,
    /// Characters of each key file included verbatim (default: 2000).
    #[serde(default = "default_max_key_file_chars")]
    pub max_key_file_chars: usize,
}

fn default_max_file_changes() -> usize {
    20
}

fn default_max_commit_messages() -> usize {
    10
}

fn default_max_key_file_chars() -> usize {
    2000
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_file_changes: default_max_file_changes(),
            max_commit_messages: default_max_commit_messages(),
            max_key_file_chars: default_max_key_file_chars(),
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".bounty-review/reviews.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Worker pool and queue-level retry configuration.
///
/// # Examples
///
/// ```
/// use bounty_core::QueueConfig;
///
/// let config = QueueConfig::default();
/// assert_eq!(config.attempts, 1);
/// assert_eq!(config.context_workers, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Concurrent stage-1 workers (default: 2).
    #[serde(default = "default_workers")]
    pub context_workers: usize,
    /// Concurrent stage-2 workers (default: 2).
    #[serde(default = "default_workers")]
    pub review_workers: usize,
    /// Idle poll interval in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Attempts per job; 1 disables queue-level retry (default: 1).
    #[serde(default = "default_queue_attempts")]
    pub attempts: u32,
    /// Base of the queue-level exponential backoff in milliseconds (default: 5000).
    #[serde(default = "default_queue_backoff_ms")]
    pub backoff_ms: u64,
    /// Seconds after which an active job is considered stalled (default: 600).
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_queue_attempts() -> u32 {
    1
}

fn default_queue_backoff_ms() -> u64 {
    5000
}

fn default_stall_timeout_secs() -> u64 {
    600
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            context_workers: default_workers(),
            review_workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            attempts: default_queue_attempts(),
            backoff_ms: default_queue_backoff_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
        }
    }
}

/// Periodic sweep for overdue submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between sweeps (default: 3600).
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Submissions enqueued per sweep at most (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_batch_size() -> usize {
    100
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// HTTP intake bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = BountyConfig::default();
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert_eq!(config.github.max_attempts, 3);
        assert_eq!(config.github.base_delay_ms, 1000);
        assert_eq!(config.github.key_files.len(), 5);
        assert_eq!(config.github.recent_commits, 10);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.review.max_file_changes, 20);
        assert_eq!(config.review.max_commit_messages, 10);
        assert_eq!(config.review.max_key_file_chars, 2000);
        assert_eq!(config.queue.attempts, 1);
        assert_eq!(config.sweep.interval_secs, 3600);
        assert_eq!(config.sweep.batch_size, 100);
        assert_eq!(config.server.port, 3001);
        assert_eq!(
            config.database.path,
            PathBuf::from(".bounty-review/reviews.db")
        );
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[github]
api_base = "http://localhost:9999"
max_attempts = 5
key_files = ["README.md", "Cargo.toml"]

[llm]
model = "gpt-4o-mini"
base_url = "http://localhost:8080"

[queue]
context_workers = 4
attempts = 3

[sweep]
enabled = false
batch_size = 25

[server]
port = 8080
"#;
        let config = BountyConfig::from_toml(toml).unwrap();
        assert_eq!(config.github.api_base, "http://localhost:9999");
        assert_eq!(config.github.max_attempts, 5);
        assert_eq!(config.github.base_delay_ms, 1000);
        assert_eq!(config.github.key_files, vec!["README.md", "Cargo.toml"]);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.queue.context_workers, 4);
        assert_eq!(config.queue.review_workers, 2);
        assert_eq!(config.queue.attempts, 3);
        assert!(!config.sweep.enabled);
        assert_eq!(config.sweep.batch_size, 25);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = BountyConfig::from_toml("").unwrap();
        assert_eq!(config.github.max_attempts, 3);
        assert_eq!(config.llm.model, "gpt-4-turbo-preview");
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = BountyConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = BountyConfig::from_toml(
            r#"
[github]
token = "from-file"

[server]
port = 4000
"#,
        )
        .unwrap();
        config.apply_env(|key| match key {
            "GITHUB_TOKEN" => Some("from-env".into()),
            "OPENAI_API_KEY" => Some("sk-test".into()),
            "BOUNTY_DB_PATH" => Some("/tmp/x.db".into()),
            "PORT" => Some("5000".into()),
            _ => None,
        });
        assert_eq!(config.github.token.as_deref(), Some("from-env"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn provider_selects_api_key_variable() {
        let mut config = BountyConfig::from_toml(
            r#"
[llm]
provider = "anthropic"
"#,
        )
        .unwrap();
        config.apply_env(|key| match key {
            "ANTHROPIC_API_KEY" => Some("sk-ant".into()),
            "OPENAI_API_KEY" => Some("sk-openai".into()),
            _ => None,
        });
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-ant"));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = BountyConfig::default();
        config.apply_env(|_| Some(String::new()));
        assert!(config.github.token.is_none());
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[sweep]\nbatch_size = 7\n").unwrap();
        let config = BountyConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sweep.batch_size, 7);
    }
}
