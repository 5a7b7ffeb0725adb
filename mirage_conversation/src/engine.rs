//! Per-identity conversation engine.
//!
//! Each command is one turn: the stored transcript, a fresh copy of the
//! system contract and the command go to the provider; the cleaned reply is
//! appended with the command and persisted.

use crate::cleanup::clean_response;
use crate::prompt::{DEFAULT_TEMPLATE, default_prompt, exemplar, render_system_prompt};
use crate::session::ConversationSession;
use async_trait::async_trait;
use mirage_config::LlmConfig;
use mirage_core::{ChatMessage, CommandInterpreter, HistoryStore, LLMProvider};
use mirage_providers::{ProviderError, build_provider};
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Who the engine is talking to and how the contract is worded.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// History key and the user shown in prompts.
    pub identity: String,
    /// Host shown in prompts.
    pub host: String,
    /// Custom system template; [`DEFAULT_TEMPLATE`] when `None`.
    pub template: Option<String>,
}

impl EngineSettings {
    #[must_use]
    pub fn new(identity: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            host: host.into(),
            template: None,
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM provider error: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("Empty response from LLM")]
    EmptyResponse,
}

impl From<ProviderError> for ConversationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Provider(other.into()),
        }
    }
}

pub struct ConversationEngine<P = Arc<dyn LLMProvider>, S = Arc<dyn HistoryStore>>
where
    P: Send + Sync,
    S: Send + Sync,
{
    provider: P,
    store: S,
    identity: String,
    host: String,
    system_prompt: String,
    session: ConversationSession,
}

impl ConversationEngine {
    /// Build the provider from `llm` and open the identity's transcript.
    ///
    /// A missing model or credential fails here, before any traffic.
    pub async fn connect(
        llm: &LlmConfig,
        client: Client,
        store: Arc<dyn HistoryStore>,
        identity: &str,
        host: &str,
    ) -> Result<Self, ConversationError> {
        let provider = build_provider(llm, client)?;
        let settings =
            EngineSettings::new(identity, host).with_template(llm.system_prompt.clone());

        Ok(Self::new(provider, store, settings).await)
    }
}

impl<P, S> ConversationEngine<P, S>
where
    P: LLMProvider + Send + Sync,
    S: HistoryStore + Send + Sync,
{
    /// Load the identity's transcript, seeding and persisting the contract
    /// plus exemplar when nothing is stored. Seeding is atomic in the store,
    /// so simultaneous first logins share one seed.
    ///
    /// Store failures are logged; the engine then runs on memory alone.
    pub async fn new(provider: P, store: S, settings: EngineSettings) -> Self {
        let EngineSettings {
            identity,
            host,
            template,
        } = settings;
        let system_prompt = render_system_prompt(
            template.as_deref().unwrap_or(DEFAULT_TEMPLATE),
            &identity,
            &host,
        );

        let mut seed = vec![ChatMessage::system(system_prompt.clone())];
        seed.extend(exemplar(&identity, &host));
        let messages = match store.seed_if_absent(&identity, &seed).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to load or seed history for {identity}, running in memory: {e}");
                seed
            }
        };
        let session = ConversationSession::from_messages(messages, &system_prompt);

        info!(
            "Conversation ready for {identity}@{host} ({} messages, model {})",
            session.message_count(),
            provider.model()
        );

        Self {
            provider,
            store,
            identity,
            host,
            system_prompt,
            session,
        }
    }

    /// Run one command through the model and return the cleaned output.
    ///
    /// Nothing is recorded when the provider fails or answers blank.
    pub async fn execute(&mut self, command: &str) -> Result<String, ConversationError> {
        let request = self.session.request_for(&self.system_prompt, command);
        debug!(
            "Sending {} messages for {}: {command:?}",
            request.len(),
            self.identity
        );

        let response = self
            .provider
            .chat(&request)
            .await
            .map_err(ConversationError::Provider)?;

        let cleaned = clean_response(&response.content);
        if cleaned.trim().is_empty() {
            return Err(ConversationError::EmptyResponse);
        }

        if let Some(usage) = response.usage {
            debug!(
                "Tokens: {} prompt + {} completion = {} total",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        let turn = [ChatMessage::user(command), ChatMessage::assistant(cleaned.clone())];
        if let Err(e) = self.store.append(&self.identity, &turn).await {
            warn!("Failed to persist turn for {}: {e}", self.identity);
        }
        let [user, assistant] = turn;
        self.session.push(user);
        self.session.push(assistant);

        Ok(cleaned)
    }

    /// Prompt at the end of the last reply, or the home prompt when the
    /// reply does not end in one.
    #[must_use]
    pub fn current_prompt(&self) -> String {
        self.session
            .last_assistant()
            .and_then(|m| trailing_prompt(&m.content))
            .map_or_else(
                || default_prompt(&self.identity, &self.host),
                ToString::to_string,
            )
    }

    #[must_use]
    pub const fn session(&self) -> &ConversationSession {
        &self.session
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

fn trailing_prompt(reply: &str) -> Option<&str> {
    let last_line = reply.rsplit('\n').next().unwrap_or(reply);
    (last_line.ends_with("$ ") || last_line.ends_with("# ")).then_some(last_line)
}

#[async_trait]
impl<P, S> CommandInterpreter for ConversationEngine<P, S>
where
    P: LLMProvider + Send + Sync,
    S: HistoryStore + Send + Sync,
{
    async fn interpret(&mut self, command: &str) -> anyhow::Result<String> {
        Ok(self.execute(command).await?)
    }

    fn prompt(&self) -> String {
        self.current_prompt()
    }
}
