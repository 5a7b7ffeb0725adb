#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Chat-completion backends.
//!
//! Every backend receives the same `{model, messages, stream: false}` body
//! over HTTP POST; they differ in credential handling and in where the reply
//! text lives in the response. Each kind gets its own strategy type that owns
//! both the request builder and the response normalizer.

use mirage_config::{LlmConfig, ProviderKind};
use mirage_core::{ChatMessage, LLMProvider};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

mod error;
mod ollama;
mod openai;
pub mod retry;

pub use error::ProviderError;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Default chat endpoint for a provider kind.
#[must_use]
pub const fn default_endpoint(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "https://api.openai.com/v1/chat/completions",
        ProviderKind::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
        ProviderKind::Grok => "https://api.x.ai/v1/chat/completions",
        ProviderKind::Ollama => "http://localhost:11434/api/chat",
    }
}

/// Whether requests to this kind must carry a bearer credential.
#[must_use]
pub const fn requires_api_key(kind: ProviderKind) -> bool {
    !matches!(kind, ProviderKind::Ollama)
}

/// Build the provider strategy selected by `config`.
///
/// Fails with [`ProviderError::Configuration`] before any network traffic
/// when the model is empty or a credentialed kind has no API key.
pub fn build_provider(
    config: &LlmConfig,
    client: Client,
) -> Result<Arc<dyn LLMProvider>, ProviderError> {
    let transport = ChatTransport::from_config(config, client)?;

    let provider: Arc<dyn LLMProvider> = match config.provider {
        ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::Grok => Arc::new(
            OpenAiCompatibleProvider::new(config.provider, config.model.clone(), transport),
        ),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config.model.clone(), transport)),
    };

    Ok(provider)
}

/// Standard request body shared by every backend.
pub(crate) fn chat_body(model: &str, messages: &[ChatMessage]) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "stream": false,
    })
}

/// HTTP plumbing shared by the provider strategies.
#[derive(Debug, Clone)]
pub struct ChatTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
    retry_delays: Vec<Duration>,
}

impl ChatTransport {
    pub fn from_config(config: &LlmConfig, client: Client) -> Result<Self, ProviderError> {
        if config.model.trim().is_empty() {
            return Err(ProviderError::Configuration(format!(
                "no model configured for provider {}",
                config.provider
            )));
        }

        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(ToString::to_string);

        if requires_api_key(config.provider) && api_key.is_none() {
            return Err(ProviderError::Configuration(format!(
                "API key is required for provider {}",
                config.provider
            )));
        }

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint(config.provider).to_string());

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout: Duration::from_secs(config.request_timeout_secs),
            retry_delays: config
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `body` and return the decoded JSON reply, retrying transient
    /// failures.
    pub(crate) async fn post(&self, body: &Value) -> Result<Value, ProviderError> {
        retry::retry_with_backoff(
            || self.try_send(body),
            &self.retry_delays,
            ProviderError::is_retryable,
        )
        .await
    }

    async fn try_send(&self, body: &Value) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::Malformed(e.to_string())
            } else {
                self.classify(e)
            }
        })
    }

    fn classify(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            }
        } else {
            ProviderError::Transport(error)
        }
    }
}

/// Read a non-blank string at `pointer`, or report it missing.
pub(crate) fn content_at(
    response: &Value,
    pointer: &'static str,
) -> Result<String, ProviderError> {
    response
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(ToString::to_string)
        .ok_or(ProviderError::MissingContent { path: pointer })
}
