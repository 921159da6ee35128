//! Storage error types

use branch_tree::{ConversationId, TreeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task join error: {0}")]
    Task(String),
}

impl StoreError {
    /// True for every "referenced id does not exist" failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::Tree(TreeError::NotFound { .. }) | StoreError::ConversationNotFound(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
