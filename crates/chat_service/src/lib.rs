//! Conversation operations over a branchable history, with the model call
//! that produces each reply.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod service;

pub use bootstrap::{build_provider, build_service, build_storage};
pub use config::{AppConfig, Backend, ConfigError, AVAILABLE_MODELS, DEFAULT_MODEL};
pub use error::{Result, ServiceError};
pub use service::{context_messages, ConversationService};
