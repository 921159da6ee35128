//! Language-model clients that turn prior conversation turns plus a new
//! prompt into a single assistant reply.

pub mod error;
pub mod openai;
pub mod provider;

pub use error::{ReplyError, Result};
pub use openai::{OpenAiReplyProvider, DEFAULT_API_BASE};
pub use provider::{ChatMessage, ReplyProvider, Role};
