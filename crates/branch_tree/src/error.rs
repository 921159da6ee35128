use std::fmt;

use crate::ids::{BranchId, NodeId};

/// The kind of entity an operation failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Node,
    Branch,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Node => f.write_str("node"),
            Entity::Branch => f.write_str("branch"),
        }
    }
}

/// Errors raised by tree operations. A failed operation never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },
}

impl TreeError {
    pub fn node_not_found(id: &NodeId) -> Self {
        TreeError::NotFound {
            entity: Entity::Node,
            id: id.to_string(),
        }
    }

    pub fn branch_not_found(id: &BranchId) -> Self {
        TreeError::NotFound {
            entity: Entity::Branch,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
