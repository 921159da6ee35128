use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Produce the assistant's reply to `messages`, whose last entry is the
    /// new user prompt.
    ///
    /// # Arguments
    /// * `messages` - Prior turns in timeline order, then the prompt
    /// * `model` - Model identifier sent upstream
    async fn reply(&self, messages: &[ChatMessage], model: &str) -> Result<String>;
}
