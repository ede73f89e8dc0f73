//! Review generation against an OpenAI-compatible reasoning service.
//!
//! Provides the chat client, prompt assembly from a
//! [`bounty_core::ReviewContext`], strict validation of the structured
//! response, and the [`Reviewer`] seam used by the job pipeline.

pub mod llm;
pub mod prompt;
pub mod reviewer;

pub use reviewer::{LlmReviewer, Reviewer};
