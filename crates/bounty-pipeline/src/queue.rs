use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bounty_core::{BountyError, QueueConfig, SubmissionRef};
use bounty_store::{format_timestamp, parse_timestamp, Database};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Stage 1: fetch GitHub context.
pub const CONTEXT_QUEUE: &str = "github:generateContext";
/// Stage 2: generate and persist the review.
pub const REVIEW_QUEUE: &str = "github:reviewSubmission";

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "active" => Ok(JobStatus::Active),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!(
                "unknown job status: {other} (expected queued, active, completed, or failed)"
            )),
        }
    }
}

/// A unit of work claimed from, or listed in, a queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub queue: String,
    #[serde(flatten)]
    pub submission: SubmissionRef,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the current one for active jobs.
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Proof of a reservation: the job id plus the attempt number it was
/// claimed under.
///
/// Every settle operation is conditional on the row still being active
/// under the same attempt, so a worker whose job was re-queued by
/// [`JobQueue::recover_stalled`] and claimed again cannot settle it twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub job_id: i64,
    pub attempt: u32,
}

impl Job {
    pub fn lease(&self) -> Lease {
        Lease {
            job_id: self.id,
            attempt: self.attempts,
        }
    }

    /// Deserialize the payload into a stage's job data.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Serialization`] if the payload has the wrong
    /// shape. Such jobs are never retried.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BountyError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Selection for [`SqliteJobQueue::list`].
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub queue: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            queue: None,
            status: None,
            limit: 50,
        }
    }
}

/// Number of jobs in one queue with one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueCount {
    pub queue: String,
    pub status: JobStatus,
    pub count: u64,
}

/// Durable work queue shared by the pipeline stages and the workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to `queue`, runnable immediately. Returns its id.
    async fn enqueue(
        &self,
        queue: &str,
        submission: &SubmissionRef,
        payload: serde_json::Value,
    ) -> Result<i64, BountyError>;

    /// Claim the oldest runnable job in `queue`, marking it active.
    async fn reserve(&self, queue: &str) -> Result<Option<Job>, BountyError>;

    /// Mark the leased job as done. Returns `false` if the lease was lost.
    async fn complete(&self, lease: Lease) -> Result<bool, BountyError>;

    /// Complete the leased job and enqueue its follow-up in one
    /// transaction. Returns the new job id, or `None` (enqueuing nothing)
    /// if the lease was lost.
    async fn hand_off(
        &self,
        lease: Lease,
        queue: &str,
        submission: &SubmissionRef,
        payload: serde_json::Value,
    ) -> Result<Option<i64>, BountyError>;

    /// Record a failed attempt. When `retry` is set and attempts remain, the
    /// job is re-queued after an exponential backoff; otherwise it is marked
    /// failed. Returns the job's new status, or `None` if the lease was lost.
    async fn fail(
        &self,
        lease: Lease,
        error: &str,
        retry: bool,
    ) -> Result<Option<JobStatus>, BountyError>;

    /// Refresh the lease so the reaper leaves a long-running job alone.
    /// Returns `false` if the lease was lost.
    async fn heartbeat(&self, lease: Lease) -> Result<bool, BountyError>;

    /// Re-queue active jobs whose lease is older than `timeout`.
    async fn recover_stalled(&self, timeout: Duration) -> Result<usize, BountyError>;
}

/// [`JobQueue`] over the `jobs` table.
///
/// Jobs survive restarts; a job claimed by a process that died is put back
/// by [`JobQueue::recover_stalled`].
///
/// # Examples
///
/// ```
/// use bounty_core::QueueConfig;
/// use bounty_pipeline::SqliteJobQueue;
/// use bounty_store::Database;
///
/// let queue = SqliteJobQueue::new(Database::in_memory().unwrap(), &QueueConfig::default());
/// assert_eq!(queue.max_attempts(), 1);
/// ```
#[derive(Clone)]
pub struct SqliteJobQueue {
    db: Database,
    max_attempts: u32,
    backoff_ms: u64,
}

const JOB_COLUMNS: &str = "id, queue, submission_url, bounty_id, payload, status, attempts, \
                           max_attempts, last_error, run_at, created_at, updated_at";

/// Matches the leased row only while it is still active under the same attempt.
const LEASE_FENCE: &str = "id = ?1 AND status = 'active' AND attempts = ?2";

fn db_err(action: &str) -> impl Fn(rusqlite::Error) -> BountyError + '_ {
    move |e| BountyError::Database(format!("failed to {action}: {e}"))
}

struct NewJob {
    queue: String,
    submission_url: String,
    bounty_id: String,
    payload: String,
    max_attempts: u32,
}

impl NewJob {
    fn new(
        queue: &str,
        submission: &SubmissionRef,
        payload: &serde_json::Value,
        max_attempts: u32,
    ) -> Result<Self, BountyError> {
        Ok(Self {
            queue: queue.to_string(),
            submission_url: submission.submission_url.clone(),
            bounty_id: submission.bounty_id.clone(),
            payload: serde_json::to_string(payload)?,
            max_attempts,
        })
    }

    fn insert(&self, conn: &rusqlite::Connection, now: &str) -> Result<i64, BountyError> {
        conn.execute(
            "INSERT INTO jobs (queue, submission_url, bounty_id, payload, status,
                               attempts, max_attempts, run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?6, ?6)",
            params![
                self.queue,
                self.submission_url,
                self.bounty_id,
                self.payload,
                self.max_attempts,
                now
            ],
        )
        .map_err(db_err("enqueue job"))?;
        Ok(conn.last_insert_rowid())
    }
}

impl SqliteJobQueue {
    pub fn new(db: Database, config: &QueueConfig) -> Self {
        Self {
            db,
            max_attempts: config.attempts.max(1),
            backoff_ms: config.backoff_ms,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempts + 1`: `backoff_ms * 2^(attempts-1)`.
    fn retry_delay(&self, attempts: u32) -> TimeDelta {
        let exponent = attempts.saturating_sub(1).min(20);
        let ms = self.backoff_ms.saturating_mul(1u64 << exponent);
        TimeDelta::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 1_000_000))
    }

    /// Jobs matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] on query failure.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, BountyError> {
        let status = filter.status.map(|s| s.as_str());
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let rows = self
            .db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE (?1 IS NULL OR queue = ?1) AND (?2 IS NULL OR status = ?2)
                     ORDER BY id DESC LIMIT ?3"
                );
                let mut stmt = conn.prepare(&sql).map_err(db_err("prepare job listing"))?;
                let rows = stmt
                    .query_map(params![filter.queue, status, limit], read_row)
                    .map_err(db_err("list jobs"))?;
                rows.collect::<Result<Vec<_>, _>>().map_err(db_err("read job"))
            })
            .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Job totals grouped by queue and status.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] on query failure.
    pub async fn counts(&self) -> Result<Vec<QueueCount>, BountyError> {
        let rows: Vec<(String, String, i64)> = self
            .db
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT queue, status, COUNT(*) FROM jobs
                         GROUP BY queue, status ORDER BY queue, status",
                    )
                    .map_err(db_err("prepare job counts"))?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                    .map_err(db_err("count jobs"))?;
                rows.collect::<Result<_, _>>().map_err(db_err("read job count"))
            })
            .await?;
        rows.into_iter()
            .map(|(queue, status, count)| {
                Ok(QueueCount {
                    queue,
                    status: status.parse().map_err(BountyError::Queue)?,
                    count: u64::try_from(count).unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        submission: &SubmissionRef,
        payload: serde_json::Value,
    ) -> Result<i64, BountyError> {
        let job = NewJob::new(queue, submission, &payload, self.max_attempts)?;
        let now = format_timestamp(Utc::now());
        let id = self.db.call(move |conn| job.insert(conn, &now)).await?;
        debug!(job_id = id, queue, submission = %submission, "job enqueued");
        Ok(id)
    }

    async fn reserve(&self, queue: &str) -> Result<Option<Job>, BountyError> {
        let queue = queue.to_string();
        let now = format_timestamp(Utc::now());
        let row = self
            .db
            .call(move |conn| {
                let sql = format!(
                    "UPDATE jobs
                     SET status = 'active', attempts = attempts + 1,
                         locked_at = ?2, updated_at = ?2
                     WHERE id = (
                         SELECT id FROM jobs
                         WHERE queue = ?1 AND status = 'queued' AND run_at <= ?2
                         ORDER BY run_at, id LIMIT 1)
                     RETURNING {JOB_COLUMNS}"
                );
                conn.query_row(&sql, params![queue, now], read_row)
                    .optional()
                    .map_err(db_err("reserve job"))
            })
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn complete(&self, lease: Lease) -> Result<bool, BountyError> {
        let now = format_timestamp(Utc::now());
        let updated = self
            .db
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "UPDATE jobs SET status = 'completed', locked_at = NULL, updated_at = ?3
                         WHERE {LEASE_FENCE}"
                    ),
                    params![lease.job_id, lease.attempt, now],
                )
                .map_err(db_err("complete job"))
            })
            .await?;
        Ok(updated == 1)
    }

    async fn hand_off(
        &self,
        lease: Lease,
        queue: &str,
        submission: &SubmissionRef,
        payload: serde_json::Value,
    ) -> Result<Option<i64>, BountyError> {
        let next = NewJob::new(queue, submission, &payload, self.max_attempts)?;
        let now = format_timestamp(Utc::now());
        let id = self
            .db
            .call(move |conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(db_err("begin transaction"))?;
                let held = tx
                    .execute(
                        &format!(
                            "UPDATE jobs SET status = 'completed', locked_at = NULL, updated_at = ?3
                             WHERE {LEASE_FENCE}"
                        ),
                        params![lease.job_id, lease.attempt, now],
                    )
                    .map_err(db_err("complete job"))?;
                if held == 0 {
                    return Ok(None);
                }
                let id = next.insert(&tx, &now)?;
                tx.commit().map_err(db_err("commit transaction"))?;
                Ok(Some(id))
            })
            .await?;
        if let Some(id) = id {
            debug!(job_id = id, from_job = lease.job_id, queue, "job handed off");
        }
        Ok(id)
    }

    async fn fail(
        &self,
        lease: Lease,
        error: &str,
        retry: bool,
    ) -> Result<Option<JobStatus>, BountyError> {
        let error = error.to_string();
        let queue = self.clone();
        self.db
            .call(move |conn| {
                let tx = conn
                    .unchecked_transaction()
                    .map_err(db_err("begin transaction"))?;
                let Some(max_attempts) = tx
                    .query_row(
                        &format!("SELECT max_attempts FROM jobs WHERE {LEASE_FENCE}"),
                        params![lease.job_id, lease.attempt],
                        |row| row.get::<_, u32>(0),
                    )
                    .optional()
                    .map_err(db_err("load job"))?
                else {
                    return Ok(None);
                };

                let now = Utc::now();
                let (status, run_at) = if retry && lease.attempt < max_attempts {
                    (JobStatus::Queued, now + queue.retry_delay(lease.attempt))
                } else {
                    (JobStatus::Failed, now)
                };
                tx.execute(
                    "UPDATE jobs
                     SET status = ?2, last_error = ?3, run_at = ?4, locked_at = NULL,
                         updated_at = ?5
                     WHERE id = ?1",
                    params![
                        lease.job_id,
                        status.as_str(),
                        error,
                        format_timestamp(run_at),
                        format_timestamp(now)
                    ],
                )
                .map_err(db_err("fail job"))?;
                tx.commit().map_err(db_err("commit transaction"))?;
                Ok(Some(status))
            })
            .await
    }

    async fn heartbeat(&self, lease: Lease) -> Result<bool, BountyError> {
        let now = format_timestamp(Utc::now());
        let updated = self
            .db
            .call(move |conn| {
                conn.execute(
                    &format!("UPDATE jobs SET locked_at = ?3, updated_at = ?3 WHERE {LEASE_FENCE}"),
                    params![lease.job_id, lease.attempt, now],
                )
                .map_err(db_err("extend job lease"))
            })
            .await?;
        Ok(updated == 1)
    }

    async fn recover_stalled(&self, timeout: Duration) -> Result<usize, BountyError> {
        let timeout = TimeDelta::from_std(timeout)
            .map_err(|e| BountyError::Queue(format!("invalid stall timeout: {e}")))?;
        let now = Utc::now();
        let cutoff = format_timestamp(now - timeout);
        let now = format_timestamp(now);
        let recovered = self
            .db
            .call(move |conn| {
                conn.execute(
                    "UPDATE jobs SET status = 'queued', locked_at = NULL, updated_at = ?2
                     WHERE status = 'active' AND locked_at < ?1",
                    params![cutoff, now],
                )
                .map_err(db_err("recover stalled jobs"))
            })
            .await?;
        if recovered > 0 {
            warn!(count = recovered, "re-queued stalled jobs");
        }
        Ok(recovered)
    }
}

struct JobRow {
    id: i64,
    queue: String,
    submission_url: String,
    bounty_id: String,
    payload: String,
    status: String,
    attempts: u32,
    max_attempts: u32,
    last_error: Option<String>,
    run_at: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        queue: row.get(1)?,
        submission_url: row.get(2)?,
        bounty_id: row.get(3)?,
        payload: row.get(4)?,
        status: row.get(5)?,
        attempts: row.get(6)?,
        max_attempts: row.get(7)?,
        last_error: row.get(8)?,
        run_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl JobRow {
    fn into_job(self) -> Result<Job, BountyError> {
        Ok(Job {
            id: self.id,
            queue: self.queue,
            submission: SubmissionRef::new(self.submission_url, self.bounty_id),
            payload: serde_json::from_str(&self.payload)?,
            status: self.status.parse().map_err(BountyError::Queue)?,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            last_error: self.last_error,
            run_at: parse_timestamp(&self.run_at)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
