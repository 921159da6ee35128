//! Wiring a [`ConversationService`] from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use conversation_store::{ConversationRegistry, FileTreeStorage, SqliteTreeStorage, TreeStorage};
use reply_client::{ChatMessage, OpenAiReplyProvider, ReplyError, ReplyProvider};
use tracing::info;

use crate::config::{AppConfig, Backend};
use crate::error::Result;
use crate::service::ConversationService;

/// Stands in for the model when no API key is configured, so every
/// operation except asking for a reply still works.
struct MissingKeyProvider;

#[async_trait]
impl ReplyProvider for MissingKeyProvider {
    async fn reply(&self, _messages: &[ChatMessage], _model: &str) -> reply_client::Result<String> {
        Err(ReplyError::Auth("OPENAI_API_KEY is not set".to_string()))
    }
}

pub fn build_storage(config: &AppConfig) -> Arc<dyn TreeStorage> {
    match config.backend {
        Backend::File => Arc::new(FileTreeStorage::new(config.data_dir())),
        Backend::Sqlite => Arc::new(SqliteTreeStorage::new(config.database_path())),
    }
}

pub fn build_provider(config: &AppConfig) -> Arc<dyn ReplyProvider> {
    match &config.api_key {
        Some(api_key) => Arc::new(
            OpenAiReplyProvider::new(api_key.clone())
                .with_base_url(config.api_base())
                .with_timeout(config.request_timeout()),
        ),
        None => Arc::new(MissingKeyProvider),
    }
}

pub async fn build_service(config: &AppConfig) -> Result<ConversationService> {
    let storage = build_storage(config);
    let registry = ConversationRegistry::new(storage).await?;
    let model = config.model().to_string();
    info!(backend = ?config.backend, model = %model, "Conversation service ready");
    Ok(ConversationService::new(registry, build_provider(config), model))
}
