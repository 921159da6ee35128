use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::lenient::null_as_default;

pub const SEED_USER_MSG: &str = "Start your conversation...";
pub const SEED_AI_MSG: &str = "Hi! How can I help you?";

/// One exchange (one turn) in a conversation.
///
/// `parent_id` records provenance only. Branch membership and ordering come
/// exclusively from each branch's `node_ids`, so a node's recorded parent can
/// differ from its predecessor in some of the branches that contain it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Node {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: NodeId,

    #[serde(default)]
    pub user_msg: Option<String>,

    #[serde(default)]
    pub ai_msg: Option<String>,

    #[serde(default)]
    pub parent_id: Option<NodeId>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: String,

    #[serde(with = "crate::timestamp", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Node {
    pub fn new(
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> Self {
        Self {
            id: NodeId::generate(),
            user_msg,
            ai_msg,
            parent_id,
            annotations: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// The greeting node every fresh conversation starts from.
    pub fn seed() -> Self {
        Self::new(
            Some(SEED_USER_MSG.to_string()),
            Some(SEED_AI_MSG.to_string()),
            None,
        )
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let node: Node = serde_json::from_str(r#"{"id": "n1"}"#).unwrap();
        assert_eq!(node.id.as_str(), "n1");
        assert!(node.user_msg.is_none());
        assert!(node.ai_msg.is_none());
        assert!(node.parent_id.is_none());
        assert_eq!(node.annotations, "");
    }

    #[test]
    fn null_annotations_become_empty() {
        let node: Node =
            serde_json::from_str(r#"{"id": "n1", "annotations": null, "timestamp": null}"#)
                .unwrap();
        assert_eq!(node.annotations, "");
    }

    #[test]
    fn null_id_reads_as_empty() {
        let node: Node = serde_json::from_str(r#"{"id": null, "user_msg": "hi"}"#).unwrap();
        assert!(node.id.as_str().is_empty());
        assert_eq!(node.user_msg.as_deref(), Some("hi"));
    }

    #[test]
    fn equality_is_by_id() {
        let a = Node::seed();
        let mut b = a.clone();
        b.annotations = "edited".to_string();
        assert_eq!(a, b);
        assert_ne!(a, Node::seed());
    }
}
