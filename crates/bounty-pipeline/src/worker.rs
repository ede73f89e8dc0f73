use std::time::Duration;

use bounty_core::{BountyError, QueueConfig};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::jobs::Pipeline;
use crate::queue::{JobStatus, Lease, CONTEXT_QUEUE, REVIEW_QUEUE};

/// Drains both stage queues with a fixed number of tokio tasks each.
///
/// Every task handles one job at a time, so a job sleeping through a
/// rate-limit wait only holds its own task.
pub struct WorkerPool {
    pipeline: Pipeline,
    config: QueueConfig,
}

impl WorkerPool {
    pub fn new(pipeline: Pipeline, config: QueueConfig) -> Self {
        Self { pipeline, config }
    }

    /// Reserve and run at most one job from `queue`.
    ///
    /// Returns `Ok(true)` if a job was processed, whether it succeeded or
    /// not; the job's own failure is reported to the queue, not returned.
    ///
    /// # Errors
    ///
    /// Only queue bookkeeping failures are returned.
    pub async fn run_once(&self, queue: &str) -> Result<bool, BountyError> {
        run_one(&self.pipeline, queue, heartbeat_period(&self.config)).await
    }

    /// Start the workers plus a stalled-job reaper.
    ///
    /// A running job renews its lease every third of the stall timeout, so
    /// the reaper only reclaims jobs whose worker has gone away.
    ///
    /// Tasks stop polling once `shutdown` flips to `true`; a job already in
    /// progress runs to completion first.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> JoinSet<()> {
        let mut set = JoinSet::new();
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let heartbeat = heartbeat_period(&self.config);

        for (queue, count) in [
            (CONTEXT_QUEUE, self.config.context_workers),
            (REVIEW_QUEUE, self.config.review_workers),
        ] {
            for worker in 0..count {
                let pipeline = self.pipeline.clone();
                let shutdown = shutdown.clone();
                set.spawn(async move {
                    worker_loop(pipeline, queue, worker, poll, heartbeat, shutdown).await;
                });
            }
        }

        let stall = Duration::from_secs(self.config.stall_timeout_secs);
        let pipeline = self.pipeline.clone();
        set.spawn(reaper_loop(pipeline, stall, shutdown));

        info!(
            context_workers = self.config.context_workers,
            review_workers = self.config.review_workers,
            "worker pool started"
        );
        set
    }
}

/// Three heartbeats fit in one stall window.
fn heartbeat_period(config: &QueueConfig) -> Duration {
    (Duration::from_secs(config.stall_timeout_secs) / 3).max(Duration::from_secs(1))
}

async fn run_one(
    pipeline: &Pipeline,
    queue: &str,
    heartbeat: Duration,
) -> Result<bool, BountyError> {
    let Some(job) = pipeline.queue().reserve(queue).await? else {
        return Ok(false);
    };
    let lease = job.lease();
    debug!(job_id = job.id, queue, attempt = job.attempts, "processing job");

    let work = pipeline.process(&job);
    tokio::pin!(work);
    let mut beat = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            _ = beat.tick() => keep_alive(pipeline, lease).await,
        }
    };

    match result {
        Ok(true) => debug!(job_id = job.id, queue, "job completed"),
        Ok(false) => warn!(job_id = job.id, queue, "job lease lost, result discarded"),
        Err(e) => {
            let status = pipeline
                .queue()
                .fail(lease, &e.to_string(), e.is_transient())
                .await?;
            match status {
                Some(JobStatus::Queued) => warn!(
                    job_id = job.id,
                    queue,
                    attempt = job.attempts,
                    error = %e,
                    "job failed, will retry"
                ),
                Some(_) => error!(
                    job_id = job.id,
                    queue,
                    submission_url = %job.submission.submission_url,
                    bounty_id = %job.submission.bounty_id,
                    error = %e,
                    "job failed"
                ),
                None => warn!(
                    job_id = job.id,
                    queue,
                    error = %e,
                    "job lease lost, failure discarded"
                ),
            }
        }
    }
    Ok(true)
}

async fn keep_alive(pipeline: &Pipeline, lease: Lease) {
    match pipeline.queue().heartbeat(lease).await {
        Ok(true) => {}
        Ok(false) => warn!(job_id = lease.job_id, "job lease lost while running"),
        Err(e) => warn!(job_id = lease.job_id, error = %e, "heartbeat failed"),
    }
}

async fn worker_loop(
    pipeline: Pipeline,
    queue: &'static str,
    worker: usize,
    poll: Duration,
    heartbeat: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(queue, worker, "worker started");
    while !*shutdown.borrow() {
        match run_one(&pipeline, queue, heartbeat).await {
            // Drain without sleeping while there is work.
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => error!(queue, worker, error = %e, "queue error"),
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll) => {}
        }
    }
    debug!(queue, worker, "worker stopped");
}

async fn reaper_loop(pipeline: Pipeline, stall: Duration, mut shutdown: watch::Receiver<bool>) {
    let period = (stall / 2).max(Duration::from_secs(1));
    while !*shutdown.borrow() {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(period) => {
                if let Err(e) = pipeline.queue().recover_stalled(stall).await {
                    error!(error = %e, "failed to recover stalled jobs");
                }
            }
        }
    }
}
