use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BranchId, NodeId};
use crate::lenient::{list_without_nulls, null_as_default};

pub const DEFAULT_BRANCH_NAME: &str = "main";

/// A named, ordered view over the nodes of one root-to-tip path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Branch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: BranchId,

    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Where this branch's visible history begins (the fork point for forks).
    #[serde(default, deserialize_with = "null_as_default")]
    pub root_node_id: NodeId,

    /// The authoritative, append-only timeline of this branch.
    #[serde(default, deserialize_with = "list_without_nulls")]
    pub node_ids: Vec<NodeId>,

    #[serde(with = "crate::timestamp", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Branch {
    /// A branch whose history is just its root.
    pub fn new(name: impl Into<String>, root_node_id: NodeId) -> Self {
        let node_ids = vec![root_node_id.clone()];
        Self::with_history(name, root_node_id, node_ids)
    }

    pub fn with_history(
        name: impl Into<String>,
        root_node_id: NodeId,
        node_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            id: BranchId::generate(),
            name: name.into(),
            root_node_id,
            node_ids,
            created_at: Utc::now(),
        }
    }

    pub fn tip(&self) -> Option<&NodeId> {
        self.node_ids.last()
    }

    pub fn position_of(&self, node_id: &NodeId) -> Option<usize> {
        self.node_ids.iter().position(|id| id == node_id)
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.position_of(node_id).is_some()
    }
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Branch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_branch_contains_its_root() {
        let root = NodeId::from_raw("root");
        let branch = Branch::new("main", root.clone());
        assert_eq!(branch.node_ids, vec![root.clone()]);
        assert_eq!(branch.tip(), Some(&root));
        assert_eq!(branch.position_of(&root), Some(0));
    }

    #[test]
    fn missing_node_ids_deserialize_empty() {
        let branch: Branch =
            serde_json::from_str(r#"{"id": "b1", "name": "main", "root_node_id": "n1"}"#)
                .unwrap();
        assert!(branch.node_ids.is_empty());
        assert!(branch.tip().is_none());
    }

    #[test]
    fn null_fields_read_like_missing_ones() {
        let branch: Branch = serde_json::from_str(
            r#"{"id": null, "name": null, "root_node_id": null, "node_ids": ["n1", null]}"#,
        )
        .unwrap();
        assert!(branch.id.as_str().is_empty());
        assert_eq!(branch.name, "");
        assert!(branch.root_node_id.as_str().is_empty());
        assert_eq!(branch.node_ids, vec![NodeId::from_raw("n1")]);

        let branch: Branch = serde_json::from_str(r#"{"id": "b1", "node_ids": null}"#).unwrap();
        assert!(branch.node_ids.is_empty());
    }
}
