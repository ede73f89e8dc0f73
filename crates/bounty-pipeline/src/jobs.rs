use std::sync::Arc;

use bounty_context::ContextSource;
use bounty_core::{BountyError, ReviewContext, ReviewOutcome, SubmissionRef};
use bounty_review::Reviewer;
use bounty_store::OutcomeStore;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::queue::{Job, JobQueue, CONTEXT_QUEUE, REVIEW_QUEUE};

/// Stage-1 payload: what an external trigger submits.
///
/// # Examples
///
/// ```
/// use bounty_pipeline::ContextJob;
///
/// let job = ContextJob::new("https://github.com/o/r/pull/7", "B1", "Implement X");
/// let json = serde_json::to_value(&job).unwrap();
/// assert_eq!(json["submissionUrl"], "https://github.com/o/r/pull/7");
/// assert_eq!(json["bountyRequirements"], "Implement X");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextJob {
    #[serde(flatten)]
    pub submission: SubmissionRef,
    pub bounty_requirements: String,
}

impl ContextJob {
    pub fn new(
        submission_url: impl Into<String>,
        bounty_id: impl Into<String>,
        bounty_requirements: impl Into<String>,
    ) -> Self {
        Self {
            submission: SubmissionRef::new(submission_url, bounty_id),
            bounty_requirements: bounty_requirements.into(),
        }
    }
}

/// Stage-2 payload: the fetched context handed over by stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewJob {
    #[serde(flatten)]
    pub submission: SubmissionRef,
    pub review_context: ReviewContext,
}

/// The two stage processors and the handles they share.
///
/// Every collaborator is injected, so tests can run the real chaining
/// against fakes and an in-memory queue.
#[derive(Clone)]
pub struct Pipeline {
    context: Arc<dyn ContextSource>,
    reviewer: Arc<dyn Reviewer>,
    outcomes: Arc<dyn OutcomeStore>,
    queue: Arc<dyn JobQueue>,
}

impl Pipeline {
    pub fn new(
        context: Arc<dyn ContextSource>,
        reviewer: Arc<dyn Reviewer>,
        outcomes: Arc<dyn OutcomeStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            context,
            reviewer,
            outcomes,
            queue,
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn outcomes(&self) -> &Arc<dyn OutcomeStore> {
        &self.outcomes
    }

    /// Entry point: enqueue stage 1 for a submission. Returns the job id.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Database`] if the job cannot be stored.
    pub async fn submit(&self, job: &ContextJob) -> Result<i64, BountyError> {
        let id = self
            .queue
            .enqueue(CONTEXT_QUEUE, &job.submission, serde_json::to_value(job)?)
            .await?;
        info!(
            job_id = id,
            submission_url = %job.submission.submission_url,
            bounty_id = %job.submission.bounty_id,
            "review process initiated"
        );
        Ok(id)
    }

    /// Stage 1 without the handoff: fetch context and build the stage-2
    /// payload.
    ///
    /// # Errors
    ///
    /// Whatever the context source raised once its own retries are spent.
    pub async fn fetch_context(&self, job: &ContextJob) -> Result<ReviewJob, BountyError> {
        let submission = &job.submission;
        info!(
            submission_url = %submission.submission_url,
            bounty_id = %submission.bounty_id,
            "starting context generation"
        );

        let github_context = match self.context.fetch(&submission.submission_url).await {
            Ok(context) => context,
            Err(e) => {
                error!(
                    submission_url = %submission.submission_url,
                    bounty_id = %submission.bounty_id,
                    error = %e,
                    "error generating context"
                );
                return Err(e);
            }
        };

        Ok(ReviewJob {
            submission: submission.clone(),
            review_context: ReviewContext {
                github_context,
                bounty_requirements: job.bounty_requirements.clone(),
                submission: submission.clone(),
            },
        })
    }

    /// Stage 1: fetch context and enqueue one stage-2 job.
    ///
    /// Nothing is persisted on failure; the error goes back to the caller.
    /// Workers go through [`Pipeline::process`] instead, which ties the
    /// enqueue to the job's lease.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::fetch_context`], or a queue error if stage 2
    /// cannot be enqueued.
    pub async fn generate_context(&self, job: &ContextJob) -> Result<i64, BountyError> {
        let review = self.fetch_context(job).await?;
        let id = self
            .queue
            .enqueue(REVIEW_QUEUE, &review.submission, serde_json::to_value(&review)?)
            .await?;
        log_handoff(id, &review.submission);
        Ok(id)
    }

    /// Stage 2: generate the review and persist the outcome.
    ///
    /// A failed review is saved with its error message before the error is
    /// returned, so the queue still sees the failure.
    ///
    /// # Errors
    ///
    /// The reviewer's error (after it has been persisted), or a store error.
    pub async fn review_submission(&self, job: &ReviewJob) -> Result<ReviewOutcome, BountyError> {
        let submission = &job.submission;
        match self.reviewer.review(&job.review_context).await {
            Ok(result) => {
                let outcome = ReviewOutcome::completed(submission.clone(), result);
                self.outcomes.save(&outcome).await?;
                info!(
                    submission_url = %submission.submission_url,
                    bounty_id = %submission.bounty_id,
                    score = ?outcome.score,
                    "review completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    submission_url = %submission.submission_url,
                    bounty_id = %submission.bounty_id,
                    error = %e,
                    "error processing review"
                );
                let outcome = ReviewOutcome::failed(submission.clone(), e.to_string());
                self.outcomes.save(&outcome).await?;
                Err(e)
            }
        }
    }

    /// Run both stages back to back without the queue.
    ///
    /// Used for one-off reviews from the command line; the outcome is
    /// persisted exactly as the queued path would.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::fetch_context`] and
    /// [`Pipeline::review_submission`].
    pub async fn run_inline(&self, job: &ContextJob) -> Result<ReviewOutcome, BountyError> {
        let review = self.fetch_context(job).await?;
        self.review_submission(&review).await
    }

    /// Run a reserved job and settle it under its lease.
    ///
    /// Stage 1 completes its job and enqueues stage 2 in one step, so a
    /// job that was reclaimed by another worker hands off at most once.
    /// Returns `false` when the lease was lost and the result discarded.
    /// On error the job is left for the caller to fail.
    ///
    /// # Errors
    ///
    /// [`BountyError::Queue`] for an unknown queue,
    /// [`BountyError::Serialization`] for a malformed payload, otherwise the
    /// stage's own error.
    pub async fn process(&self, job: &Job) -> Result<bool, BountyError> {
        let lease = job.lease();
        match job.queue.as_str() {
            CONTEXT_QUEUE => {
                let review = self.fetch_context(&job.decode::<ContextJob>()?).await?;
                let next = self
                    .queue
                    .hand_off(
                        lease,
                        REVIEW_QUEUE,
                        &review.submission,
                        serde_json::to_value(&review)?,
                    )
                    .await?;
                if let Some(id) = next {
                    log_handoff(id, &review.submission);
                }
                Ok(next.is_some())
            }
            REVIEW_QUEUE => {
                self.review_submission(&job.decode::<ReviewJob>()?).await?;
                self.queue.complete(lease).await
            }
            other => Err(BountyError::Queue(format!("unknown queue: {other}"))),
        }
    }
}

fn log_handoff(job_id: i64, submission: &SubmissionRef) {
    info!(
        job_id,
        submission_url = %submission.submission_url,
        bounty_id = %submission.bounty_id,
        "context generated and review job queued"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_core::{GitHubContext, RepoContext};
    use serde_json::json;

    #[test]
    fn review_job_payload_shape() {
        let submission = SubmissionRef::new("https://github.com/o/r", "B1");
        let job = ReviewJob {
            submission: submission.clone(),
            review_context: ReviewContext {
                github_context: GitHubContext::Repo(RepoContext {
                    name: "r".into(),
                    description: String::new(),
                    language: "Go".into(),
                    stars: 0,
                    forks: 0,
                    created_at: String::new(),
                    updated_at: String::new(),
                    key_files: vec![],
                    recent_commits: vec![],
                }),
                bounty_requirements: "Implement X".into(),
                submission,
            },
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["submissionUrl"], "https://github.com/o/r");
        assert_eq!(value["bountyId"], "B1");
        assert_eq!(value["reviewContext"]["githubContext"]["type"], "repo");
        assert_eq!(value["reviewContext"]["bountyRequirements"], "Implement X");

        let back: ReviewJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn context_job_rejects_missing_fields() {
        let payload = json!({ "submissionUrl": "https://github.com/o/r" });
        assert!(serde_json::from_value::<ContextJob>(payload).is_err());
    }
}
