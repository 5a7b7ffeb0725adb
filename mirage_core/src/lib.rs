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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub mod audit;

pub use audit::{AuditEvent, AuditSink, EventKind, JsonLinesAuditSink, TracingAuditSink};

/// Identity used until the peer submits a username.
pub const UNKNOWN_IDENTITY: &str = "unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => anyhow::bail!("Unknown message role: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A text-generation backend bound to one model.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LLMResponse>;
    fn model(&self) -> &str;
}

/// Per-identity transcript persistence with sliding expiry.
///
/// Implementations serialize concurrent writers internally and keep the
/// insertion order of each identity's rows.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Unexpired messages for `identity`, oldest first.
    async fn load(&self, identity: &str) -> anyhow::Result<Vec<ChatMessage>>;

    /// Append `messages` in order and push the identity's expiry out to a
    /// full TTL from now.
    async fn append(&self, identity: &str, messages: &[ChatMessage]) -> anyhow::Result<()>;

    /// Store `seed` only if the identity has no live messages, as one step.
    ///
    /// Returns the identity's live transcript afterwards: the existing rows
    /// when there were any, otherwise `seed` itself. Concurrent first
    /// contacts for one identity therefore seed exactly once.
    async fn seed_if_absent(
        &self,
        identity: &str,
        seed: &[ChatMessage],
    ) -> anyhow::Result<Vec<ChatMessage>>;

    /// Delete every expired row, returning how many were removed.
    async fn cleanup(&self) -> anyhow::Result<u64>;
}

#[async_trait]
impl<T: LLMProvider + ?Sized> LLMProvider for Arc<T> {
    async fn chat(&self, messages: &[ChatMessage]) -> anyhow::Result<LLMResponse> {
        (**self).chat(messages).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

#[async_trait]
impl<T: HistoryStore + ?Sized> HistoryStore for Arc<T> {
    async fn load(&self, identity: &str) -> anyhow::Result<Vec<ChatMessage>> {
        (**self).load(identity).await
    }

    async fn append(&self, identity: &str, messages: &[ChatMessage]) -> anyhow::Result<()> {
        (**self).append(identity, messages).await
    }

    async fn seed_if_absent(
        &self,
        identity: &str,
        seed: &[ChatMessage],
    ) -> anyhow::Result<Vec<ChatMessage>> {
        (**self).seed_if_absent(identity, seed).await
    }

    async fn cleanup(&self) -> anyhow::Result<u64> {
        (**self).cleanup().await
    }
}

/// Turns one submitted command line into terminal output.
#[async_trait]
pub trait CommandInterpreter: Send {
    async fn interpret(&mut self, command: &str) -> anyhow::Result<String>;

    /// The prompt the peer should be looking at right now.
    fn prompt(&self) -> String;
}

#[async_trait]
impl<T: CommandInterpreter + ?Sized> CommandInterpreter for Box<T> {
    async fn interpret(&mut self, command: &str) -> anyhow::Result<String> {
        (**self).interpret(command).await
    }

    fn prompt(&self) -> String {
        (**self).prompt()
    }
}

/// Opens a [`CommandInterpreter`] for an authenticated identity.
#[async_trait]
pub trait InterpreterFactory: Send + Sync {
    /// `host` is the address shown in prompts.
    async fn open(&self, identity: &str, host: &str)
    -> anyhow::Result<Box<dyn CommandInterpreter>>;
}

/// One accepted connection.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: Uuid,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    #[must_use]
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            id: Uuid::now_v7(),
            source,
            destination,
            username: UNKNOWN_IDENTITY.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Start an audit event for this session.
    #[must_use]
    pub fn event(&self, kind: EventKind) -> AuditEvent {
        AuditEvent::new(kind, self.id, self.source, self.destination)
    }
}
