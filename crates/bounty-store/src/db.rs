//! Shared SQLite connection and schema.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bounty_core::BountyError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS github_reviews (
    submission_url TEXT NOT NULL,
    bounty_id TEXT NOT NULL,
    score REAL,
    notes TEXT,
    labels TEXT,
    status TEXT NOT NULL CHECK (status IN ('pending', 'completed', 'failed')),
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (submission_url, bounty_id)
);

CREATE TABLE IF NOT EXISTS submissions (
    submission_url TEXT NOT NULL,
    bounty_id TEXT NOT NULL,
    bounty_requirements TEXT NOT NULL DEFAULT '',
    submission_type TEXT NOT NULL DEFAULT 'github',
    deadline TEXT NOT NULL,
    PRIMARY KEY (submission_url, bounty_id)
);

CREATE INDEX IF NOT EXISTS submissions_deadline ON submissions(deadline);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    submission_url TEXT NOT NULL,
    bounty_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('queued', 'active', 'completed', 'failed')),
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    last_error TEXT,
    run_at TEXT NOT NULL,
    locked_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS jobs_ready ON jobs(queue, status, run_at);
CREATE INDEX IF NOT EXISTS jobs_ref ON jobs(submission_url, bounty_id);
";

/// Process-wide SQLite handle shared by the outcome store, the submission
/// table and the job queue.
///
/// Cloning is cheap. Statements run on the blocking thread pool via
/// [`Database::call`] so async workers are never stalled by disk I/O; the
/// connection itself is serialized behind a mutex and SQLite's own locking
/// makes each upsert atomic.
///
/// # Examples
///
/// ```
/// use bounty_store::Database;
///
/// let db = Database::in_memory().unwrap();
/// let _other_handle = db.clone();
/// ```
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at `path`, creating parent directories
    /// and the schema as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] if the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, BountyError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BountyError::Database(format!("failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BountyError::Database(format!("failed to open database: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BountyError::Database(format!("failed to enable WAL: {e}")))?;
        debug!(path = %path.display(), "opened database");
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing and one-shot runs).
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, BountyError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            BountyError::Database(format!("failed to create in-memory database: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, BountyError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| BountyError::Database(format!("failed to set busy timeout: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| BountyError::Database(format!("failed to create schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`, or [`BountyError::Database`]
    /// if the connection lock is poisoned or the task panics.
    pub async fn call<F, T>(&self, f: F) -> Result<T, BountyError>
    where
        F: FnOnce(&Connection) -> Result<T, BountyError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| BountyError::Database("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| BountyError::Database(format!("database task failed: {e}")))?
    }
}

/// Wrap a rusqlite error with what was being attempted.
pub(crate) fn db_err(action: &str) -> impl Fn(rusqlite::Error) -> BountyError + '_ {
    move |e| BountyError::Database(format!("failed to {action}: {e}"))
}

/// Fixed-width UTC timestamp so stored values compare lexicographically.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use bounty_store::format_timestamp;
///
/// let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// assert_eq!(format_timestamp(t), "2024-03-01T12:00:00.000Z");
/// ```
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
///
/// # Errors
///
/// Returns [`BountyError::Database`] if the value is not RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, BountyError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BountyError::Database(format!("invalid timestamp '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_is_created() {
        let db = Database::in_memory().unwrap();
        let tables: Vec<String> = db
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                    .map_err(db_err("list tables"))?;
                let rows = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(db_err("list tables"))?;
                rows.collect::<Result<_, _>>().map_err(db_err("list tables"))
            })
            .await
            .unwrap();
        assert!(tables.contains(&"github_reviews".to_string()));
        assert!(tables.contains(&"submissions".to_string()));
        assert!(tables.contains(&"jobs".to_string()));
    }

    #[tokio::test]
    async fn open_creates_parent_directory_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/reviews.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
        Database::open(&path).unwrap();
    }

    #[test]
    fn timestamps_parse_back() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
