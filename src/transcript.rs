//! Chat messages and the conversation transcript.
//!
//! The transcript is the single source of truth for both rendering and
//! persistence. System-role messages are widget-local notices: they are
//! shown and persisted, but never sent to the engine.

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
}

/// Ordered, append-only conversation history. Cleared only by explicit user
/// action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.messages)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self { messages: serde_json::from_str(json)? })
    }

    /// The message list sent to the engine: the injected system prompt
    /// followed by user/assistant turns. Local notices stay out.
    pub fn request_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(ChatMessage { role: ChatRole::System, content: system_prompt.to_string() });
        out.extend(
            self.messages
                .iter()
                .filter(|m| m.role != ChatRole::System)
                .cloned(),
        );
        out
    }
}
