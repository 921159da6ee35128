//! The persisted shape of one conversation.

use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::ids::{BranchId, ConversationId, NodeId};
use crate::lenient::list_without_nulls;
use crate::node::Node;

const TITLE_PREVIEW_CHARS: usize = 20;
const TITLE_PREVIEW_LIMIT: usize = 23;

/// One conversation's nodes, branches and active pointers, exactly as stored.
///
/// Every field is optional on read; structural repair happens in
/// [`TreeState::heal`](crate::TreeState::heal), not here.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ConversationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "list_without_nulls")]
    pub nodes: Vec<Node>,

    #[serde(default, deserialize_with = "list_without_nulls")]
    pub branches: Vec<Branch>,

    #[serde(default)]
    pub current_node_id: Option<NodeId>,

    #[serde(default)]
    pub current_branch_id: Option<BranchId>,
}

impl ConversationDocument {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable label: explicit title, else a preview of the first
    /// node's user message, else `Conversation <id suffix>`.
    pub fn display_title(&self, id: &ConversationId) -> String {
        let first_user_msg = self.nodes.first().and_then(|node| node.user_msg.as_deref());
        resolve_title(self.title.as_deref(), first_user_msg, id)
    }
}

pub(crate) fn resolve_title(
    title: Option<&str>,
    first_user_msg: Option<&str>,
    id: &ConversationId,
) -> String {
    if let Some(title) = title.map(str::trim) {
        if !title.is_empty() {
            return title.to_string();
        }
    }
    match first_user_msg {
        Some(text) if !text.is_empty() => preview(text),
        _ => fallback_title(id),
    }
}

pub fn fallback_title(id: &ConversationId) -> String {
    format!("Conversation {}", id.short())
}

fn preview(text: &str) -> String {
    if text.chars().count() > TITLE_PREVIEW_LIMIT {
        let head: String = text.chars().take(TITLE_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_first_message(msg: Option<&str>) -> ConversationDocument {
        let node = Node::new(msg.map(str::to_string), None, None);
        ConversationDocument {
            nodes: vec![node],
            ..Default::default()
        }
    }

    #[test]
    fn explicit_title_wins() {
        let mut doc = doc_with_first_message(Some("hello"));
        doc.title = Some("Trip planning".to_string());
        let id = ConversationId::from_raw("conv_00000001");
        assert_eq!(doc.display_title(&id), "Trip planning");
    }

    #[test]
    fn short_first_message_is_used_verbatim() {
        let doc = doc_with_first_message(Some("exactly twenty-three c"));
        let id = ConversationId::from_raw("conv_00000001");
        assert_eq!(doc.display_title(&id), "exactly twenty-three c");
    }

    #[test]
    fn long_first_message_is_truncated() {
        let doc = doc_with_first_message(Some("a very long opening question indeed"));
        let id = ConversationId::from_raw("conv_00000001");
        assert_eq!(doc.display_title(&id), "a very long opening ...");
    }

    #[test]
    fn empty_document_falls_back_to_id_label() {
        let doc = ConversationDocument::default();
        let id = ConversationId::from_raw("conv_abcdef12");
        assert_eq!(doc.display_title(&id), "Conversation abcdef12");

        let blank = doc_with_first_message(None);
        assert_eq!(blank.display_title(&id), "Conversation abcdef12");
    }

    #[test]
    fn tolerates_missing_top_level_fields() {
        let doc = ConversationDocument::from_json(r#"{"nodes": []}"#).unwrap();
        assert!(doc.branches.is_empty());
        assert!(doc.current_branch_id.is_none());
        assert!(doc.current_node_id.is_none());
    }
}
