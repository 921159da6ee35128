//! Live, persisted tree of one conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use branch_tree::{
    Branch, BranchId, BranchSummary, ConversationId, HealReport, Node, NodeId, NodePatch,
    TreeError, TreeState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::storage::TreeStorage;

/// Which conversation, branch and node a caller is positioned on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub conversation_id: ConversationId,
    pub branch_id: BranchId,
    pub node_id: NodeId,
}

/// One conversation's tree, kept in memory and written through to storage
/// on every mutation.
///
/// Mutations hold the write lock until the storage write finishes, so
/// concurrent callers on the same store are applied and persisted one at a
/// time in lock order. A failed write leaves the in-memory tree ahead of
/// storage; [`TreeStore::reload`] discards that.
///
/// Once [`TreeStore::delete`] succeeds every later operation on the same
/// handle fails with [`StoreError::ConversationNotFound`] and nothing is
/// written back.
pub struct TreeStore {
    conversation_id: ConversationId,
    storage: Arc<dyn TreeStorage>,
    state: RwLock<TreeState>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("conversation_id", &self.conversation_id)
            .field("deleted", &self.deleted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TreeStore {
    /// Load, heal and re-persist the conversation. Never fails on missing or
    /// damaged data, only on storage errors.
    pub async fn open(
        storage: Arc<dyn TreeStorage>,
        conversation_id: ConversationId,
    ) -> StoreResult<Self> {
        let state = load_healed(storage.as_ref(), &conversation_id).await?;
        Ok(Self {
            conversation_id,
            storage,
            state: RwLock::new(state),
            deleted: AtomicBool::new(false),
        })
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Append an exchange to the active branch and make it the active node.
    pub async fn add_exchange(
        &self,
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> StoreResult<Node> {
        self.mutate(|state| state.add_exchange(user_msg, ai_msg, parent_id))
            .await
    }

    /// Append an exchange to `branch_id` whether or not it is still the
    /// active branch. The active node only moves if it is.
    pub async fn append_exchange(
        &self,
        branch_id: &BranchId,
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> StoreResult<Node> {
        self.mutate(|state| state.append_exchange(branch_id, user_msg, ai_msg, parent_id))
            .await
    }

    /// Fork a new branch ending at `from_node_id` and switch to it.
    pub async fn fork_branch(
        &self,
        name: impl Into<String>,
        from_node_id: &NodeId,
    ) -> StoreResult<Branch> {
        let name = name.into();
        self.mutate(|state| state.fork_branch(name, from_node_id))
            .await
    }

    pub async fn switch_branch(&self, branch_id: &BranchId) -> StoreResult<Cursor> {
        self.mutate(|state| state.switch_branch(branch_id)).await?;
        Ok(self.cursor().await)
    }

    pub async fn update_node(&self, node_id: &NodeId, patch: NodePatch) -> StoreResult<Node> {
        self.mutate(|state| state.update_node(node_id, patch)).await
    }

    pub async fn rename_branch(
        &self,
        branch_id: &BranchId,
        name: impl Into<String>,
    ) -> StoreResult<Branch> {
        let name = name.into();
        self.mutate(|state| state.rename_branch(branch_id, name))
            .await
    }

    pub async fn set_title(&self, title: Option<String>) -> StoreResult<()> {
        self.mutate(|state| {
            state.set_title(title);
            Ok::<_, TreeError>(())
        })
        .await
    }

    /// Owned copy of a branch's timeline; the active branch when `None`.
    pub async fn timeline(&self, branch_id: Option<&BranchId>) -> StoreResult<Vec<Node>> {
        let state = self.state.read().await;
        self.ensure_present()?;
        let nodes = state.timeline(branch_id)?;
        Ok(nodes.into_iter().cloned().collect())
    }

    /// The cursor and the active branch's timeline, read together.
    pub async fn context(&self) -> StoreResult<(Cursor, Vec<Node>)> {
        let state = self.state.read().await;
        self.ensure_present()?;
        let cursor = Cursor {
            conversation_id: self.conversation_id.clone(),
            branch_id: state.current_branch_id().clone(),
            node_id: state.current_node_id().clone(),
        };
        let nodes = state.timeline(Some(&cursor.branch_id))?;
        Ok((cursor, nodes.into_iter().cloned().collect()))
    }

    pub async fn cursor(&self) -> Cursor {
        let state = self.state.read().await;
        Cursor {
            conversation_id: self.conversation_id.clone(),
            branch_id: state.current_branch_id().clone(),
            node_id: state.current_node_id().clone(),
        }
    }

    pub async fn branches(&self) -> Vec<BranchSummary> {
        self.state.read().await.branch_summaries()
    }

    pub async fn title(&self) -> String {
        self.state.read().await.display_title(&self.conversation_id)
    }

    pub async fn snapshot(&self) -> TreeState {
        self.state.read().await.clone()
    }

    /// Replace the in-memory tree with what storage currently holds.
    pub async fn reload(&self) -> StoreResult<()> {
        let mut state = self.state.write().await;
        self.ensure_present()?;
        *state = load_healed(self.storage.as_ref(), &self.conversation_id).await?;
        Ok(())
    }

    /// Remove the conversation from storage and retire this handle.
    ///
    /// Runs under the write lock, so a mutation already holding it finishes
    /// first and any mutation still waiting sees the deletion. Returns
    /// `false` if storage had nothing to delete.
    pub async fn delete(&self) -> StoreResult<bool> {
        let _state = self.state.write().await;
        self.ensure_present()?;
        let removed = self.storage.delete_document(&self.conversation_id).await?;
        self.deleted.store(true, Ordering::SeqCst);
        Ok(removed)
    }

    fn ensure_present(&self) -> StoreResult<()> {
        if self.deleted.load(Ordering::SeqCst) {
            return Err(StoreError::ConversationNotFound(self.conversation_id.clone()));
        }
        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut TreeState) -> Result<T, TreeError>,
    {
        let mut state = self.state.write().await;
        self.ensure_present()?;
        let value = operation(&mut *state)?;
        self.storage
            .save_document(&self.conversation_id, &state.to_document())
            .await?;
        Ok(value)
    }
}

/// Load a conversation and heal it, writing the healed form back.
pub async fn load_healed(
    storage: &dyn TreeStorage,
    conversation_id: &ConversationId,
) -> StoreResult<TreeState> {
    let document = storage.load_document(conversation_id).await?;
    let found = document.is_some();
    let (state, report) = TreeState::heal(document.unwrap_or_default());
    log_repairs(conversation_id, found, &report);

    storage
        .save_document(conversation_id, &state.to_document())
        .await?;
    Ok(state)
}

fn log_repairs(conversation_id: &ConversationId, found: bool, report: &HealReport) {
    if report.is_clean() {
        debug!(conversation_id = %conversation_id, "Loaded conversation");
        return;
    }
    if !found {
        info!(conversation_id = %conversation_id, "Starting conversation from an empty tree");
        return;
    }
    for repair in &report.repairs {
        warn!(conversation_id = %conversation_id, repair = %repair, "Healed stored conversation");
    }
}
