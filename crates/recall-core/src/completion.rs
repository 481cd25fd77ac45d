//! Completion service client
//!
//! [`CompletionService`] is the seam the analyzer calls through. [`OpenAiClient`]
//! implements it against an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CompletionError;
use crate::telemetry::redact;

/// Turns a single-message prompt into generated text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Chat completion request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    /// Request with one user-role message.
    pub fn user_prompt(model: &str, prompt: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion response body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Service-reported error object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
}

impl ApiError {
    /// Non-empty error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.is_empty())
    }
}

impl ChatCompletion {
    /// Extract the first choice's text, applying the failure rules: a
    /// non-empty error code or an empty choice list is a failure.
    pub fn into_text(self) -> Result<String, CompletionError> {
        if let Some(err) = &self.error {
            if let Some(code) = err.code() {
                return Err(CompletionError::Service {
                    code: code.to_string(),
                    message: err.message.clone(),
                });
            }
        }
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(CompletionError::EmptyChoices)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

/// Completion client configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Full URL of the chat completions endpoint
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Bearer token
    pub api_key: String,
    /// Whole-request HTTP timeout
    pub http_timeout: Duration,
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            http_timeout: Duration::from_secs(120),
            temperature: 0.7,
        }
    }
}

impl CompletionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        CompletionConfig {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Client for OpenAI-compatible chat completion endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: CompletionConfig,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("recall/", env!("CARGO_PKG_VERSION")))
            .timeout(config.http_timeout)
            .build()?;

        debug!(
            endpoint = %config.endpoint,
            model = %config.model,
            api_key = %redact(&config.api_key),
            "completion client configured"
        );
        Ok(OpenAiClient {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request =
            ChatRequest::user_prompt(&self.config.model, prompt, self.config.temperature);

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let completion: ChatCompletion = match serde_json::from_str(&body) {
            Ok(c) => c,
            Err(e) if status.is_success() => return Err(CompletionError::Decode(e.to_string())),
            Err(_) => {
                warn!(status = status.as_u16(), "completion service returned an error status");
                return Err(CompletionError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
        };

        debug!(
            status = status.as_u16(),
            model = %completion.model,
            choices = completion.choices.len(),
            "chat completion"
        );

        if !status.is_success() && completion.error.as_ref().and_then(ApiError::code).is_none() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        completion.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let req = ChatRequest::user_prompt("gpt-4o-mini", "hi", 0.7);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn default_config_has_no_api_key() {
        assert!(CompletionConfig::default().api_key.is_empty());
        assert_eq!(CompletionConfig::new("sk-test").api_key, "sk-test");
    }

    #[test]
    fn error_code_wins_over_choices() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"x"}}],
                "error":{"code":"rate_limit","message":"slow down","type":"requests","param":null}}"#,
        )
        .unwrap();
        match completion.into_text() {
            Err(CompletionError::Service { code, message }) => {
                assert_eq!(code, "rate_limit");
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_error_code_is_ignored() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}],
                "error":{"code":"","message":""}}"#,
        )
        .unwrap();
        assert_eq!(completion.into_text().unwrap(), "ok");
    }

    #[test]
    fn empty_choices_is_failure() {
        let completion: ChatCompletion = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            completion.into_text(),
            Err(CompletionError::EmptyChoices)
        ));
    }
}
