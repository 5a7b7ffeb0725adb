use async_trait::async_trait;
use mirage_core::{ChatMessage, LLMProvider, LLMResponse, Usage};
use serde_json::Value;
use tracing::info;

use crate::{ChatTransport, ProviderError, chat_body, content_at};

/// Ollama `/api/chat`. Reply text lives at `message.content`; no credential.
pub struct OllamaProvider {
    model: String,
    transport: ChatTransport,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(model: String, transport: ChatTransport) -> Self {
        info!("Creating ollama provider: model={model}");
        Self { model, transport }
    }

    fn normalize(response: &Value) -> Result<LLMResponse, ProviderError> {
        let content = content_at(response, "/message/content")?;

        let prompt = response["prompt_eval_count"].as_u64();
        let completion = response["eval_count"].as_u64();
        let usage = prompt.zip(completion).map(|(p, c)| Usage {
            prompt_tokens: u32::try_from(p).unwrap_or(0),
            completion_tokens: u32::try_from(c).unwrap_or(0),
            total_tokens: u32::try_from(p.saturating_add(c)).unwrap_or(u32::MAX),
        });

        Ok(LLMResponse { content, usage })
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LLMResponse> {
        let request = chat_body(&self.model, messages);

        info!(
            "Sending request to ollama API: model={}, messages={}",
            self.model,
            messages.len()
        );

        let response = self.transport.post(&request).await?;
        let normalized = Self::normalize(&response)?;

        info!("Received response from ollama API");
        Ok(normalized)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
