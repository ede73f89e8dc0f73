use async_trait::async_trait;
use bounty_core::{BountyError, LlmConfig, ReviewConfig, ReviewContext, ReviewResult};
use tracing::{debug, info};

use crate::llm::{ChatMessage, LlmClient};
use crate::prompt;

/// Anything that can score a submission against its bounty requirements.
///
/// The pipeline holds this as a trait object so tests can substitute fakes.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Produce a score, notes and labels for `context`.
    ///
    /// # Errors
    ///
    /// [`BountyError::Config`] if no credential is configured and
    /// [`BountyError::Generation`] for any service or validation failure.
    async fn review(&self, context: &ReviewContext) -> Result<ReviewResult, BountyError>;
}

/// Review generator backed by an OpenAI-compatible chat completions API.
///
/// Makes a single call per review; retries are left to the job queue.
pub struct LlmReviewer {
    llm: LlmClient,
    limits: ReviewConfig,
}

impl LlmReviewer {
    /// Create a reviewer from the `[llm]` and `[review]` sections.
    ///
    /// A missing API key is not an error here; it surfaces as
    /// [`BountyError::Config`] when a review is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Config`] if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use bounty_core::{LlmConfig, ReviewConfig};
    /// use bounty_review::LlmReviewer;
    ///
    /// let reviewer = LlmReviewer::new(&LlmConfig::default(), ReviewConfig::default()).unwrap();
    /// assert_eq!(reviewer.model(), "gpt-4-turbo-preview");
    /// ```
    pub fn new(llm: &LlmConfig, limits: ReviewConfig) -> Result<Self, BountyError> {
        Ok(Self {
            llm: LlmClient::new(llm)?,
            limits,
        })
    }

    /// Model identifier used for reviews.
    pub fn model(&self) -> &str {
        self.llm.model()
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(&self, context: &ReviewContext) -> Result<ReviewResult, BountyError> {
        if !self.llm.has_api_key() {
            return Err(BountyError::Config(
                "OPENAI_API_KEY environment variable is not set".into(),
            ));
        }

        let prompt = prompt::build_review_prompt(context, &self.limits);
        debug!(
            submission = %context.submission,
            prompt_chars = prompt.len(),
            "requesting review"
        );

        let response = self
            .llm
            .chat(&[ChatMessage::user(prompt)], &prompt::response_format())
            .await?;
        let result = prompt::parse_review_response(&response)?;

        info!(
            submission = %context.submission,
            model = self.llm.model(),
            score = result.score,
            labels = result.labels.len(),
            "review generated"
        );
        Ok(result)
    }
}
