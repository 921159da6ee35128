//! Catalogue of all stored conversations.

use std::collections::HashMap;
use std::sync::Arc;

use branch_tree::{fallback_title, ConversationId, TreeState};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::storage::TreeStorage;
use crate::tree_store::TreeStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
}

/// Creates, lists, opens and deletes conversations.
///
/// Opened trees are cached, so every caller working on one conversation
/// shares a single [`TreeStore`] and its lock.
pub struct ConversationRegistry {
    storage: Arc<dyn TreeStorage>,
    open_trees: RwLock<HashMap<ConversationId, Arc<TreeStore>>>,
}

impl ConversationRegistry {
    /// Prepares `storage` and wraps it.
    pub async fn new(storage: Arc<dyn TreeStorage>) -> StoreResult<Self> {
        storage.init().await?;
        Ok(Self {
            storage,
            open_trees: RwLock::new(HashMap::new()),
        })
    }

    pub fn storage(&self) -> Arc<dyn TreeStorage> {
        Arc::clone(&self.storage)
    }

    /// Every conversation, ordered by id.
    pub async fn list(&self) -> StoreResult<Vec<ConversationSummary>> {
        let ids = self.storage.list_documents().await?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let title = match self.storage.load_document(&id).await? {
                Some(document) => document.display_title(&id),
                None => fallback_title(&id),
            };
            summaries.push(ConversationSummary { id, title });
        }
        Ok(summaries)
    }

    /// Start a new conversation holding just the seed exchange.
    pub async fn create(&self, title: Option<String>) -> StoreResult<ConversationSummary> {
        let mut open_trees = self.open_trees.write().await;

        let mut id = ConversationId::generate();
        while open_trees.contains_key(&id) || self.storage.exists(&id).await? {
            debug!(conversation_id = %id, "Conversation id collision, regenerating");
            id = ConversationId::generate();
        }

        let mut state = TreeState::new();
        state.set_title(title.filter(|title| !title.trim().is_empty()));
        self.storage.save_document(&id, &state.to_document()).await?;

        let store = Arc::new(TreeStore::open(self.storage(), id.clone()).await?);
        let title = store.title().await;
        open_trees.insert(id.clone(), store);

        info!(conversation_id = %id, title = %title, "Created conversation");
        Ok(ConversationSummary { id, title })
    }

    /// Guarantees at least one conversation exists; returns the full list.
    pub async fn ensure_one(&self) -> StoreResult<Vec<ConversationSummary>> {
        let summaries = self.list().await?;
        if !summaries.is_empty() {
            return Ok(summaries);
        }
        self.create(None).await?;
        self.list().await
    }

    /// The live tree of an existing conversation.
    pub async fn open(&self, id: &ConversationId) -> StoreResult<Arc<TreeStore>> {
        if let Some(store) = self.open_trees.read().await.get(id) {
            return Ok(Arc::clone(store));
        }

        let mut open_trees = self.open_trees.write().await;
        if let Some(store) = open_trees.get(id) {
            return Ok(Arc::clone(store));
        }
        if !self.storage.exists(id).await? {
            return Err(StoreError::ConversationNotFound(id.clone()));
        }

        let store = Arc::new(TreeStore::open(self.storage(), id.clone()).await?);
        open_trees.insert(id.clone(), Arc::clone(&store));
        Ok(store)
    }

    /// Remove a conversation with all of its nodes and branches.
    ///
    /// An open store is deleted through its own lock, so handles still held
    /// elsewhere fail with not-found instead of writing the tree back.
    pub async fn delete(&self, id: &ConversationId) -> StoreResult<()> {
        let mut open_trees = self.open_trees.write().await;
        let removed = match open_trees.get(id) {
            Some(store) => store.delete().await?,
            None => self.storage.delete_document(id).await?,
        };
        open_trees.remove(id);
        if !removed {
            return Err(StoreError::ConversationNotFound(id.clone()));
        }
        info!(conversation_id = %id, "Deleted conversation");
        Ok(())
    }

    /// Set or clear the explicit title of a conversation.
    pub async fn rename(
        &self,
        id: &ConversationId,
        title: Option<String>,
    ) -> StoreResult<ConversationSummary> {
        let store = self.open(id).await?;
        store
            .set_title(title.filter(|title| !title.trim().is_empty()))
            .await?;
        Ok(ConversationSummary {
            id: id.clone(),
            title: store.title().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileTreeStorage;
    use tempfile::tempdir;

    async fn registry(dir: &std::path::Path) -> ConversationRegistry {
        ConversationRegistry::new(Arc::new(FileTreeStorage::new(dir)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_list() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;

        let created = registry.create(None).await.unwrap();
        let listed = registry.list().await.unwrap();

        assert!(created.id.as_str().starts_with("conv_"));
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn ensure_one_creates_only_when_empty() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;

        let first = registry.ensure_one().await.unwrap();
        let second = registry.ensure_one().await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn open_shares_one_store_per_conversation() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;
        let created = registry.create(None).await.unwrap();

        let a = registry.open(&created.id).await.unwrap();
        let b = registry.open(&created.id).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;
        let missing = ConversationId::from_raw("conv_00000000");

        assert!(registry.open(&missing).await.unwrap_err().is_not_found());
        assert!(registry.delete(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deleting_retires_handles_already_handed_out() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;
        let summary = registry.create(None).await.unwrap();
        let held = registry.open(&summary.id).await.unwrap();

        registry.delete(&summary.id).await.unwrap();

        let err = held
            .add_exchange(Some("late".into()), Some("reply".into()), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(registry.list().await.unwrap().is_empty());
        assert!(registry.open(&summary.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn titles_follow_rename_then_first_message() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path()).await;
        let created = registry.create(Some("Road trip".into())).await.unwrap();
        assert_eq!(created.title, "Road trip");

        let renamed = registry.rename(&created.id, None).await.unwrap();
        assert_eq!(renamed.title, "Start your conversat...");
    }
}
