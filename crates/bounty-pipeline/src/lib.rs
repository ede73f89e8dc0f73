//! The two-stage review pipeline.
//!
//! Stage 1 (`github:generateContext`) fetches GitHub context and hands it to
//! stage 2 (`github:reviewSubmission`) through the durable [`SqliteJobQueue`];
//! stage 2 generates the review and persists the outcome. [`WorkerPool`]
//! drains both queues and [`Sweeper`] feeds overdue submissions in.

pub mod jobs;
pub mod queue;
pub mod sweep;
pub mod worker;

pub use jobs::{ContextJob, Pipeline, ReviewJob};
pub use queue::{
    Job, JobFilter, JobQueue, JobStatus, Lease, QueueCount, SqliteJobQueue, CONTEXT_QUEUE,
    REVIEW_QUEUE,
};
pub use sweep::{SubmissionSource, Sweeper};
pub use worker::WorkerPool;
