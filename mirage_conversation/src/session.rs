//! In-memory transcript of one identity's conversation.

use mirage_core::{ChatMessage, Role};

/// Ordered, append-only transcript.
///
/// The first message is the system contract; everything after it is
/// exemplar and real (user, assistant) exchanges in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct ConversationSession {
    messages: Vec<ChatMessage>,
}

impl ConversationSession {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Wrap a loaded transcript, putting `system_prompt` in front when the
    /// stored rows do not start with a system message.
    #[must_use]
    pub fn from_messages(mut messages: Vec<ChatMessage>, system_prompt: &str) -> Self {
        if messages.first().is_none_or(|m| m.role != Role::System) {
            messages.insert(0, ChatMessage::system(system_prompt));
        }
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Request for one turn: transcript, refreshed contract, then the command.
    #[must_use]
    pub fn request_for(&self, system_prompt: &str, command: &str) -> Vec<ChatMessage> {
        let mut request = Vec::with_capacity(self.messages.len() + 2);
        request.extend_from_slice(&self.messages);
        request.push(ChatMessage::system(system_prompt));
        request.push(ChatMessage::user(command));
        request
    }

    #[must_use]
    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
