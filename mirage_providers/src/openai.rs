use async_trait::async_trait;
use mirage_config::ProviderKind;
use mirage_core::{ChatMessage, LLMProvider, LLMResponse, Usage};
use serde_json::Value;
use tracing::info;

use crate::{ChatTransport, ProviderError, chat_body, content_at};

/// OpenAI-style chat completions (OpenAI, DeepSeek, Grok).
///
/// Reply text lives at `choices[0].message.content`.
pub struct OpenAiCompatibleProvider {
    kind: ProviderKind,
    model: String,
    transport: ChatTransport,
}

impl OpenAiCompatibleProvider {
    #[must_use]
    pub fn new(kind: ProviderKind, model: String, transport: ChatTransport) -> Self {
        info!("Creating {kind} provider: model={model}");
        Self {
            kind,
            model,
            transport,
        }
    }

    fn normalize(response: &Value) -> Result<LLMResponse, ProviderError> {
        let has_choices = response["choices"]
            .as_array()
            .is_some_and(|choices| !choices.is_empty());
        if !has_choices {
            return Err(ProviderError::Malformed(
                "No choices returned from LLM provider".to_string(),
            ));
        }

        let content = content_at(response, "/choices/0/message/content")?;

        let usage = response["usage"].as_object().map(|u| Usage {
            prompt_tokens: u32::try_from(u["prompt_tokens"].as_u64().unwrap_or(0)).unwrap_or(0),
            completion_tokens: u32::try_from(u["completion_tokens"].as_u64().unwrap_or(0))
                .unwrap_or(0),
            total_tokens: u32::try_from(u["total_tokens"].as_u64().unwrap_or(0)).unwrap_or(0),
        });

        Ok(LLMResponse { content, usage })
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatibleProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LLMResponse> {
        let request = chat_body(&self.model, messages);

        info!(
            "Sending request to {} API: model={}, messages={}",
            self.kind,
            self.model,
            messages.len()
        );

        let response = self.transport.post(&request).await?;
        let normalized = Self::normalize(&response)?;

        info!("Received response from {} API", self.kind);
        Ok(normalized)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
