use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 200;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("no API key configured")]
    MissingCredential,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response is missing choices[0].message.content")]
    MalformedEnvelope,
}

/// One chat-completion round trip: system instruction plus user prompt in,
/// generated text out.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError>;
}

// ── Groq (OpenAI-compatible) client ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GroqClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CompletionError::MissingCredential);
        }
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    fn payload(&self, system: &str, prompt: &str) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "temperature": DEFAULT_TEMPERATURE,
            "max_tokens": DEFAULT_MAX_TOKENS
        })
    }
}

#[async_trait]
impl ChatCompletion for GroqClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(system, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| CompletionError::MalformedEnvelope)?;
        debug!(model = %self.model, "chat completion received");

        extract_message_content(&body)
            .map(ToString::to_string)
            .ok_or(CompletionError::MalformedEnvelope)
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion envelope.
pub fn extract_message_content(body: &serde_json::Value) -> Option<&str> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
}

// ── Tests ────────────────────────────────────────────────────────────────────
