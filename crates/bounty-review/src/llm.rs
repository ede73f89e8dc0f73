use std::time::Duration;

use bounty_core::{BountyError, LlmConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// One turn of the conversation sent to the model.
///
/// # Examples
///
/// ```
/// use bounty_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Review this submission");
/// assert_eq!(msg.role, Role::User);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint that
/// honors `response_format`.
///
/// # Examples
///
/// ```
/// use bounty_core::LlmConfig;
/// use bounty_review::llm::LlmClient;
///
/// let client = LlmClient::new(&LlmConfig::default()).unwrap();
/// assert_eq!(client.model(), "gpt-4-turbo-preview");
/// assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns [`BountyError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, BountyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BountyError::Config(format!("cannot build LLM HTTP client: {e}")))?;
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            http,
            endpoint: format!("{base}/v1/chat/completions"),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run one completion at temperature 0.1 and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`BountyError::Generation`] when the request fails or times
    /// out, on a non-2xx status, or when the reply has no message content.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        response_format: &serde_json::Value,
    ) -> Result<String, BountyError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.1,
            response_format,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            BountyError::Generation(if e.is_timeout() {
                "timeout".into()
            } else {
                format!("request failed: {e}")
            })
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BountyError::Generation(format!(
                "LLM API returned {status}: {detail}"
            )));
        }

        let reply: CompletionResponse = response
            .json()
            .await
            .map_err(|e| BountyError::Generation(format!("malformed completion: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BountyError::Generation("completion has no message content".into()))
    }
}
