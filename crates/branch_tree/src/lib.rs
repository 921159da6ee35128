//! branch_tree - the branchable conversation model
//!
//! - `node` / `branch` - the entity values
//! - `tree` - `TreeState`, the add/fork/switch/update/timeline operations
//! - `heal` - repair of loaded documents into a valid tree
//! - `document` - the persisted shape of one conversation

pub mod branch;
pub mod document;
pub mod error;
pub mod heal;
pub mod ids;
mod lenient;
pub mod node;
pub mod patch;
pub mod timestamp;
pub mod tree;

pub use branch::{Branch, DEFAULT_BRANCH_NAME};
pub use document::{fallback_title, ConversationDocument};
pub use error::{Entity, Result, TreeError};
pub use heal::{HealReport, Repair};
pub use ids::{BranchId, ConversationId, NodeId};
pub use node::{Node, SEED_AI_MSG, SEED_USER_MSG};
pub use patch::NodePatch;
pub use tree::{BranchSummary, TreeState};
