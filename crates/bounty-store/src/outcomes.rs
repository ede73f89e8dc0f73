use async_trait::async_trait;
use bounty_core::{BountyError, ReviewOutcome, ReviewStatus, SubmissionRef};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::db::{db_err, format_timestamp, parse_timestamp, Database};

/// Durable home of review outcomes, keyed by `(submission_url, bounty_id)`.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Insert or overwrite the outcome for its reference.
    ///
    /// Saving the same reference twice leaves exactly one record holding
    /// the second payload.
    async fn save(&self, outcome: &ReviewOutcome) -> Result<(), BountyError>;

    /// Fetch the outcome for a reference, if one has been saved.
    async fn load(
        &self,
        submission_url: &str,
        bounty_id: &str,
    ) -> Result<Option<ReviewOutcome>, BountyError>;
}

/// [`OutcomeStore`] backed by the `github_reviews` table.
#[derive(Clone)]
pub struct SqliteOutcomeStore {
    db: Database,
}

impl SqliteOutcomeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recently updated outcomes, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] on query failure.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ReviewOutcome>, BountyError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .db
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT submission_url, bounty_id, score, notes, labels, status, error,
                                created_at, updated_at
                         FROM github_reviews ORDER BY updated_at DESC LIMIT ?1",
                    )
                    .map_err(db_err("prepare outcome listing"))?;
                let rows = stmt
                    .query_map(params![limit], read_row)
                    .map_err(db_err("list outcomes"))?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(db_err("read outcome"))
            })
            .await?;
        rows.into_iter().map(OutcomeRow::into_outcome).collect()
    }
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn save(&self, outcome: &ReviewOutcome) -> Result<(), BountyError> {
        let labels = outcome
            .labels
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let row = (
            outcome.submission.submission_url.clone(),
            outcome.submission.bounty_id.clone(),
            outcome.score,
            outcome.notes.clone(),
            labels,
            outcome.status.to_string(),
            outcome.error.clone(),
            format_timestamp(outcome.created_at),
            format_timestamp(outcome.updated_at),
        );

        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO github_reviews
                        (submission_url, bounty_id, score, notes, labels, status, error,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(submission_url, bounty_id) DO UPDATE SET
                        score = excluded.score,
                        notes = excluded.notes,
                        labels = excluded.labels,
                        status = excluded.status,
                        error = excluded.error,
                        updated_at = excluded.updated_at",
                    params![row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8],
                )
                .map_err(db_err("save review outcome"))?;
                Ok(())
            })
            .await?;

        debug!(
            submission = %outcome.submission,
            status = %outcome.status,
            "saved review outcome"
        );
        Ok(())
    }

    async fn load(
        &self,
        submission_url: &str,
        bounty_id: &str,
    ) -> Result<Option<ReviewOutcome>, BountyError> {
        let key = (submission_url.to_string(), bounty_id.to_string());
        let row = self
            .db
            .call(move |conn| {
                conn.query_row(
                    "SELECT submission_url, bounty_id, score, notes, labels, status, error,
                            created_at, updated_at
                     FROM github_reviews WHERE submission_url = ?1 AND bounty_id = ?2",
                    params![key.0, key.1],
                    read_row,
                )
                .optional()
                .map_err(db_err("load review outcome"))
            })
            .await?;
        row.map(OutcomeRow::into_outcome).transpose()
    }
}

struct OutcomeRow {
    submission_url: String,
    bounty_id: String,
    score: Option<f64>,
    notes: Option<String>,
    labels: Option<String>,
    status: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutcomeRow> {
    Ok(OutcomeRow {
        submission_url: row.get(0)?,
        bounty_id: row.get(1)?,
        score: row.get(2)?,
        notes: row.get(3)?,
        labels: row.get(4)?,
        status: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl OutcomeRow {
    fn into_outcome(self) -> Result<ReviewOutcome, BountyError> {
        let labels = self
            .labels
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?;
        let status: ReviewStatus = self.status.parse().map_err(BountyError::Database)?;
        Ok(ReviewOutcome {
            submission: SubmissionRef::new(self.submission_url, self.bounty_id),
            score: self.score,
            notes: self.notes,
            labels,
            status,
            error: self.error,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
