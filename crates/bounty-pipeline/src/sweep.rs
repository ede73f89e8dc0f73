use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bounty_core::{BountyError, SweepConfig};
use bounty_store::{SqliteSubmissions, Submission};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::jobs::{ContextJob, Pipeline};

/// Enumerates submissions that are overdue for review.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    /// Up to `limit` submissions past their deadline at `now` that have
    /// neither an outcome nor a pending job.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Submission>, BountyError>;
}

#[async_trait]
impl SubmissionSource for SqliteSubmissions {
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Submission>, BountyError> {
        self.due_for_review(now, limit).await
    }
}

/// Periodically feeds overdue submissions into stage 1.
pub struct Sweeper {
    source: Arc<dyn SubmissionSource>,
    pipeline: Pipeline,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(source: Arc<dyn SubmissionSource>, pipeline: Pipeline, config: SweepConfig) -> Self {
        Self {
            source,
            pipeline,
            config,
        }
    }

    /// One sweep pass. Returns how many submissions were enqueued.
    ///
    /// A submission that cannot be enqueued is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the source's error if the due submissions cannot be listed.
    pub async fn run_once(&self) -> Result<usize, BountyError> {
        let due = self.source.due(Utc::now(), self.config.batch_size).await?;
        info!(count = due.len(), "found pending submissions");

        let mut enqueued = 0;
        for submission in due {
            let job = ContextJob {
                submission: submission.submission,
                bounty_requirements: submission.bounty_requirements,
            };
            match self.pipeline.submit(&job).await {
                Ok(_) => enqueued += 1,
                Err(e) => error!(
                    submission_url = %job.submission.submission_url,
                    bounty_id = %job.submission.bounty_id,
                    error = %e,
                    "failed to enqueue submission"
                ),
            }
        }
        Ok(enqueued)
    }

    /// Sweep every `interval_secs` until `shutdown` flips to `true`.
    ///
    /// The first pass runs one interval after start. Errors are logged and
    /// the loop continues.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "submission sweep scheduled");

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(count) => info!(count, "sweep enqueued submissions"),
                        Err(e) => error!(error = %e, "submission sweep failed"),
                    }
                }
            }
        }
    }
}
