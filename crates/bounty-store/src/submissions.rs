use bounty_core::{BountyError, SubmissionRef};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::{db_err, format_timestamp, parse_timestamp, Database};

/// A bounty submission known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(flatten)]
    pub submission: SubmissionRef,
    pub bounty_requirements: String,
    /// Only `github` submissions are eligible for automatic review.
    pub submission_type: String,
    pub deadline: DateTime<Utc>,
}

/// Access to the `submissions` table.
#[derive(Clone)]
pub struct SqliteSubmissions {
    db: Database,
}

impl SqliteSubmissions {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a submission, replacing any previous row for the same reference.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] on write failure.
    pub async fn upsert(&self, submission: &Submission) -> Result<(), BountyError> {
        let row = (
            submission.submission.submission_url.clone(),
            submission.submission.bounty_id.clone(),
            submission.bounty_requirements.clone(),
            submission.submission_type.clone(),
            format_timestamp(submission.deadline),
        );
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO submissions
                        (submission_url, bounty_id, bounty_requirements, submission_type, deadline)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(submission_url, bounty_id) DO UPDATE SET
                        bounty_requirements = excluded.bounty_requirements,
                        submission_type = excluded.submission_type,
                        deadline = excluded.deadline",
                    params![row.0, row.1, row.2, row.3, row.4],
                )
                .map_err(db_err("save submission"))?;
                Ok(())
            })
            .await
    }

    /// GitHub submissions whose deadline is before `now`, that have no
    /// stored outcome and no queued, active or failed job, oldest deadline
    /// first.
    ///
    /// A failed job is terminal for the sweep; resubmitting the reference by
    /// hand queues it again.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] on query failure.
    pub async fn due_for_review(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Submission>, BountyError> {
        let now = format_timestamp(now);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String, String, String, String, String)> = self
            .db
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT s.submission_url, s.bounty_id, s.bounty_requirements,
                                s.submission_type, s.deadline
                         FROM submissions s
                         WHERE s.submission_type = 'github'
                           AND s.deadline < ?1
                           AND NOT EXISTS (
                               SELECT 1 FROM github_reviews r
                               WHERE r.submission_url = s.submission_url
                                 AND r.bounty_id = s.bounty_id)
                           AND NOT EXISTS (
                               SELECT 1 FROM jobs j
                               WHERE j.submission_url = s.submission_url
                                 AND j.bounty_id = s.bounty_id
                                 AND j.status IN ('queued', 'active', 'failed'))
                         ORDER BY s.deadline
                         LIMIT ?2",
                    )
                    .map_err(db_err("prepare due submissions query"))?;
                let rows = stmt
                    .query_map(params![now, limit], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })
                    .map_err(db_err("query due submissions"))?;
                rows.collect::<Result<_, _>>()
                    .map_err(db_err("read submission"))
            })
            .await?;

        rows.into_iter()
            .map(|(url, bounty, requirements, kind, deadline)| {
                Ok(Submission {
                    submission: SubmissionRef::new(url, bounty),
                    bounty_requirements: requirements,
                    submission_type: kind,
                    deadline: parse_timestamp(&deadline)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcomes::{OutcomeStore, SqliteOutcomeStore};
    use bounty_core::ReviewOutcome;
    use chrono::Duration;

    fn submission(url: &str, kind: &str, deadline: DateTime<Utc>) -> Submission {
        Submission {
            submission: SubmissionRef::new(url, "B1"),
            bounty_requirements: "Implement X".into(),
            submission_type: kind.into(),
            deadline,
        }
    }

    async fn insert_job(db: &Database, url: &str, status: &str) {
        let (url, status) = (url.to_string(), status.to_string());
        let now = format_timestamp(Utc::now());
        db.call(move |conn| {
            conn.execute(
                "INSERT INTO jobs (queue, submission_url, bounty_id, payload, status,
                                   max_attempts, run_at, created_at, updated_at)
                 VALUES ('github:generateContext', ?1, 'B1', '{}', ?2, 1, ?3, ?3, ?3)",
                params![url, status, now],
            )
            .map_err(db_err("insert job"))?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn only_overdue_unreviewed_github_submissions_are_due() {
        let db = Database::in_memory().unwrap();
        let subs = SqliteSubmissions::new(db.clone());
        let outcomes = SqliteOutcomeStore::new(db.clone());
        let now = Utc::now();
        let past = now - Duration::hours(2);

        for s in [
            submission("https://github.com/o/due", "github", past),
            submission("https://github.com/o/future", "github", now + Duration::hours(1)),
            submission("https://gitlab.com/o/other", "gitlab", past),
            submission("https://github.com/o/reviewed", "github", past),
            submission("https://github.com/o/queued", "github", past),
            submission("https://github.com/o/active", "github", past),
            submission("https://github.com/o/failed-job", "github", past - Duration::hours(1)),
        ] {
            subs.upsert(&s).await.unwrap();
        }
        outcomes
            .save(&ReviewOutcome::failed(
                SubmissionRef::new("https://github.com/o/reviewed", "B1"),
                "timeout",
            ))
            .await
            .unwrap();
        insert_job(&db, "https://github.com/o/queued", "queued").await;
        insert_job(&db, "https://github.com/o/active", "active").await;
        insert_job(&db, "https://github.com/o/failed-job", "failed").await;

        let due = subs.due_for_review(now, 100).await.unwrap();
        let urls: Vec<&str> = due
            .iter()
            .map(|s| s.submission.submission_url.as_str())
            .collect();
        assert_eq!(urls, vec!["https://github.com/o/due"]);
    }

    #[tokio::test]
    async fn permanently_failed_context_job_is_not_swept_again() {
        let db = Database::in_memory().unwrap();
        let subs = SqliteSubmissions::new(db.clone());
        let url = "https://github.com/o/gone";
        subs.upsert(&submission(url, "github", Utc::now() - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(subs.due_for_review(Utc::now(), 10).await.unwrap().len(), 1);

        insert_job(&db, url, "failed").await;
        assert!(subs.due_for_review(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn due_respects_limit() {
        let db = Database::in_memory().unwrap();
        let subs = SqliteSubmissions::new(db);
        let past = Utc::now() - Duration::days(1);
        for i in 0..5 {
            subs.upsert(&submission(&format!("https://github.com/o/r{i}"), "github", past))
                .await
                .unwrap();
        }
        assert_eq!(subs.due_for_review(Utc::now(), 3).await.unwrap().len(), 3);
    }
}
