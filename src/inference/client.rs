//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::prompt::{ChatMessage, build_messages};
use super::{InferenceClient, InferenceReply, InferenceRequest, directive};
use crate::config::{Config, InferenceConfig};
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Sends turns to a hosted chat completions endpoint
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: SecretString,
    settings: InferenceConfig,
}

impl ChatCompletionsClient {
    /// Create a client with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the API key is empty
    pub fn new(settings: InferenceConfig, api_key: SecretString) -> Result<Self> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::Config("inference API key is empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            settings,
        })
    }

    /// Create a client from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no inference key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.inference.clone(), config.inference_key()?)
    }

    /// Model identifier sent with every request
    #[must_use]
    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

#[async_trait]
impl InferenceClient for ChatCompletionsClient {
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceReply> {
        let body = ChatRequest {
            model: &self.settings.model,
            messages: build_messages(&request),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tracing::debug!(
            model = %self.settings.model,
            history = request.history.len(),
            initial = request.turn.is_initial(),
            "sending inference request"
        );

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "inference request failed");
                Error::Inference(format!("request failed: {e}"))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Inference(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %text, "inference API error");
            return Err(Error::Inference(describe_failure(status, &text)));
        }

        parse_completion(&text)
    }
}

/// Turn a successful response body into a reply
///
/// # Errors
///
/// Returns `Error::Inference` if the payload is not a chat completion
pub fn parse_completion(body: &str) -> Result<InferenceReply> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Inference(format!("malformed response: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Inference("malformed response: no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    Ok(directive::parse_reply(&content))
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
        |_| format!("API error {status}"),
        |envelope| format!("API error {status}: {}", envelope.error.message),
    )
}
