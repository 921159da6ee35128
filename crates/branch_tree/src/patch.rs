use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Partial update of a node: every supplied field is replaced, absent fields
/// are left untouched. Branch membership and ordering are never affected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

impl NodePatch {
    pub fn with_user_msg(mut self, user_msg: impl Into<String>) -> Self {
        self.user_msg = Some(user_msg.into());
        self
    }

    pub fn with_ai_msg(mut self, ai_msg: impl Into<String>) -> Self {
        self.ai_msg = Some(ai_msg.into());
        self
    }

    pub fn with_annotations(mut self, annotations: impl Into<String>) -> Self {
        self.annotations = Some(annotations.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_msg.is_none() && self.ai_msg.is_none() && self.annotations.is_none()
    }

    pub fn apply_to(self, node: &mut Node) {
        if let Some(user_msg) = self.user_msg {
            node.user_msg = Some(user_msg);
        }
        if let Some(ai_msg) = self.ai_msg {
            node.ai_msg = Some(ai_msg);
        }
        if let Some(annotations) = self.annotations {
            node.annotations = annotations;
        }
    }
}
