use crate::engine::ConversationEngine;
use async_trait::async_trait;
use mirage_config::LlmConfig;
use mirage_core::{CommandInterpreter, HistoryStore, InterpreterFactory};
use reqwest::Client;
use std::sync::Arc;

/// Opens one [`ConversationEngine`] per shell from process-wide settings.
pub struct ConversationFactory {
    llm: LlmConfig,
    client: Client,
    store: Arc<dyn HistoryStore>,
}

impl ConversationFactory {
    #[must_use]
    pub const fn new(llm: LlmConfig, client: Client, store: Arc<dyn HistoryStore>) -> Self {
        Self { llm, client, store }
    }
}

#[async_trait]
impl InterpreterFactory for ConversationFactory {
    async fn open(
        &self,
        identity: &str,
        host: &str,
    ) -> anyhow::Result<Box<dyn CommandInterpreter>> {
        let engine = ConversationEngine::connect(
            &self.llm,
            self.client.clone(),
            Arc::clone(&self.store),
            identity,
            host,
        )
        .await?;
        Ok(Box::new(engine))
    }
}
