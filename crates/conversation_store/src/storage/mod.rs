//! Persistence adapters for conversation documents.
//!
//! A storage unit holds one conversation. Adapters only move documents in
//! and out; healing happens in [`crate::TreeStore`] after every load.

use async_trait::async_trait;
use branch_tree::{ConversationDocument, ConversationId};

use crate::error::StoreResult;

pub mod file;
pub mod sqlite;

pub use file::FileTreeStorage;
pub use sqlite::SqliteTreeStorage;

/// Moves whole conversation documents in and out of one backend.
///
/// A save followed by a load returns the same document, with one exception.
/// A node whose `parent_id` names a node outside the document keeps that
/// value in [`FileTreeStorage`] but comes back as `None` from
/// [`SqliteTreeStorage`], where the parent column is a foreign key. Branch
/// timelines never depend on `parent_id`, so only provenance differs.
#[async_trait]
pub trait TreeStorage: Send + Sync {
    /// Prepare the backing store (directories, schema).
    async fn init(&self) -> StoreResult<()>;

    /// `Ok(None)` when the unit is missing or cannot be decoded.
    async fn load_document(&self, id: &ConversationId)
        -> StoreResult<Option<ConversationDocument>>;

    /// Replace the unit with `document`; readers never observe a partial write.
    async fn save_document(
        &self,
        id: &ConversationId,
        document: &ConversationDocument,
    ) -> StoreResult<()>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_document(&self, id: &ConversationId) -> StoreResult<bool>;

    /// Every stored conversation id in ascending order.
    async fn list_documents(&self) -> StoreResult<Vec<ConversationId>>;

    async fn exists(&self, id: &ConversationId) -> StoreResult<bool>;
}
