//! Transport-independent conversation operations.

use std::sync::Arc;

use branch_tree::{
    Branch, BranchId, BranchSummary, ConversationId, Node, NodeId, NodePatch, TreeState,
};
use conversation_store::{ConversationRegistry, ConversationSummary, Cursor, TreeStore};
use reply_client::{ChatMessage, ReplyProvider};
use tracing::{info, warn};

use crate::error::Result;

/// Prior turns of `timeline` as chat messages, oldest first, followed by
/// `prompt`. Absent or empty halves of an exchange are skipped.
pub fn context_messages(timeline: &[Node], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(timeline.len() * 2 + 1);
    for node in timeline {
        if let Some(user_msg) = node.user_msg.as_deref().filter(|m| !m.is_empty()) {
            messages.push(ChatMessage::user(user_msg));
        }
        if let Some(ai_msg) = node.ai_msg.as_deref().filter(|m| !m.is_empty()) {
            messages.push(ChatMessage::assistant(ai_msg));
        }
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

pub struct ConversationService {
    registry: ConversationRegistry,
    provider: Arc<dyn ReplyProvider>,
    model: String,
}

impl ConversationService {
    pub fn new(
        registry: ConversationRegistry,
        provider: Arc<dyn ReplyProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    pub async fn create_conversation(&self, title: Option<String>) -> Result<ConversationSummary> {
        Ok(self.registry.create(title).await?)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.registry.list().await?)
    }

    /// Lists conversations, creating a first one when there are none.
    pub async fn ensure_conversation(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.registry.ensure_one().await?)
    }

    pub async fn get_timeline(
        &self,
        conversation_id: &ConversationId,
        branch_id: Option<&BranchId>,
    ) -> Result<Vec<Node>> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.timeline(branch_id).await?)
    }

    /// Ask the model for a reply to `user_msg` in the context of the active
    /// timeline, then record the exchange. Nothing is recorded when the model
    /// call fails.
    ///
    /// The exchange lands on the branch the context was read from, even if
    /// another caller switches or forks while the model is answering.
    pub async fn add_exchange(
        &self,
        conversation_id: &ConversationId,
        user_msg: impl Into<String>,
        parent_id: Option<NodeId>,
    ) -> Result<Node> {
        let user_msg = user_msg.into();
        let store = self.registry.open(conversation_id).await?;

        let (cursor, timeline) = store.context().await?;
        let messages = context_messages(&timeline, &user_msg);
        let reply = match self.provider.reply(&messages, &self.model).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    conversation_id = %conversation_id,
                    model = %self.model,
                    error = %error,
                    "Model call failed, exchange not recorded"
                );
                return Err(error.into());
            }
        };

        let parent_id = parent_id.unwrap_or(cursor.node_id);
        let node = store
            .append_exchange(&cursor.branch_id, Some(user_msg), Some(reply), Some(parent_id))
            .await?;
        info!(
            conversation_id = %conversation_id,
            branch_id = %cursor.branch_id,
            node_id = %node.id,
            "Exchange recorded"
        );
        Ok(node)
    }

    /// Record an exchange whose reply is already known, without a model call.
    pub async fn record_exchange(
        &self,
        conversation_id: &ConversationId,
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> Result<Node> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.add_exchange(user_msg, ai_msg, parent_id).await?)
    }

    pub async fn fork_branch(
        &self,
        conversation_id: &ConversationId,
        name: impl Into<String>,
        from_node_id: &NodeId,
    ) -> Result<Branch> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.fork_branch(name, from_node_id).await?)
    }

    pub async fn switch_branch(
        &self,
        conversation_id: &ConversationId,
        branch_id: &BranchId,
    ) -> Result<Cursor> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.switch_branch(branch_id).await?)
    }

    pub async fn update_node(
        &self,
        conversation_id: &ConversationId,
        node_id: &NodeId,
        patch: NodePatch,
    ) -> Result<Node> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.update_node(node_id, patch).await?)
    }

    pub async fn rename_branch(
        &self,
        conversation_id: &ConversationId,
        branch_id: &BranchId,
        name: impl Into<String>,
    ) -> Result<Branch> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.rename_branch(branch_id, name).await?)
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: Option<String>,
    ) -> Result<ConversationSummary> {
        Ok(self.registry.rename(conversation_id, title).await?)
    }

    pub async fn delete_conversation(&self, conversation_id: &ConversationId) -> Result<()> {
        Ok(self.registry.delete(conversation_id).await?)
    }

    pub async fn branches(&self, conversation_id: &ConversationId) -> Result<Vec<BranchSummary>> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.branches().await)
    }

    /// Full copy of a conversation's tree, for display and id lookup.
    pub async fn snapshot(&self, conversation_id: &ConversationId) -> Result<TreeState> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.snapshot().await)
    }

    pub async fn cursor(&self, conversation_id: &ConversationId) -> Result<Cursor> {
        let store = self.registry.open(conversation_id).await?;
        Ok(store.cursor().await)
    }

    /// Re-read a conversation from storage, dropping unsaved in-memory state.
    pub async fn reload(&self, conversation_id: &ConversationId) -> Result<Arc<TreeStore>> {
        let store = self.registry.open(conversation_id).await?;
        store.reload().await?;
        Ok(store)
    }
}
