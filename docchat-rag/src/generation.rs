//! Answer generation: the prompt model and the [`Generator`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The author of a [`Message`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and retrieved context.
    System,
    /// A question from the person chatting.
    User,
    /// A previous answer.
    Assistant,
}

/// One role-tagged message of a [`Prompt`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who authored the message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// An ordered conversation to send to a generation model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prompt {
    /// Messages in the order the model should read them.
    pub messages: Vec<Message>,
}

impl Prompt {
    /// Create an empty prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find(|m| m.role == Role::User).map(|m| m.content.as_str())
    }
}

/// A text generation backend.
///
/// Implementations make a single attempt per call; retries belong to the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`](crate::RagError::Generation) on backend failure.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// A short name for logs.
    fn name(&self) -> &str;
}
