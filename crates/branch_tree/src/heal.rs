//! Repair of loaded documents into a structurally valid tree.

use std::collections::HashMap;
use std::fmt;

use crate::branch::{Branch, DEFAULT_BRANCH_NAME};
use crate::document::ConversationDocument;
use crate::ids::{BranchId, NodeId};
use crate::node::Node;
use crate::tree::TreeState;

/// One repair applied while healing a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    SeededNode(NodeId),
    DroppedNode { id: NodeId, reason: &'static str },
    ReassignedBranchId { old: BranchId, new: BranchId },
    PrunedDanglingIds { branch: BranchId, removed: usize },
    MovedBranchRoot { branch: BranchId, root: NodeId },
    RemovedEmptyBranch(BranchId),
    CreatedDefaultBranch(BranchId),
    FilledEmptyBranch(BranchId),
    ResetActiveBranch(BranchId),
    ResetActiveNode(NodeId),
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::SeededNode(id) => write!(f, "seeded node {id}"),
            Repair::DroppedNode { id, reason } => write!(f, "dropped node '{id}': {reason}"),
            Repair::ReassignedBranchId { old, new } => {
                write!(f, "reassigned branch id '{old}' to {new}")
            }
            Repair::PrunedDanglingIds { branch, removed } => {
                write!(f, "pruned {removed} dangling node ids from branch {branch}")
            }
            Repair::MovedBranchRoot { branch, root } => {
                write!(f, "moved root of branch {branch} to {root}")
            }
            Repair::RemovedEmptyBranch(id) => write!(f, "removed empty branch {id}"),
            Repair::CreatedDefaultBranch(id) => write!(f, "created default branch {id}"),
            Repair::FilledEmptyBranch(id) => write!(f, "filled empty branch {id}"),
            Repair::ResetActiveBranch(id) => write!(f, "active branch reset to {id}"),
            Repair::ResetActiveNode(id) => write!(f, "active node reset to {id}"),
        }
    }
}

/// Everything healing changed; empty when the document was already valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealReport {
    pub repairs: Vec<Repair>,
}

impl HealReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    fn push(&mut self, repair: Repair) {
        self.repairs.push(repair);
    }
}

impl TreeState {
    /// Turns any document, including an empty or damaged one, into a tree
    /// that satisfies every structural invariant.
    pub fn heal(document: ConversationDocument) -> (TreeState, HealReport) {
        let mut report = HealReport::default();

        let mut nodes: HashMap<NodeId, Node> = HashMap::new();
        let mut node_order = Vec::new();
        for node in document.nodes {
            if node.id.is_empty() {
                report.push(Repair::DroppedNode {
                    id: node.id,
                    reason: "empty id",
                });
                continue;
            }
            if nodes.contains_key(&node.id) {
                report.push(Repair::DroppedNode {
                    id: node.id,
                    reason: "duplicate id",
                });
                continue;
            }
            node_order.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        let mut current_node_id = document
            .current_node_id
            .filter(|id| nodes.contains_key(id));

        if nodes.is_empty() {
            let seed = Node::seed();
            report.push(Repair::SeededNode(seed.id.clone()));
            current_node_id = Some(seed.id.clone());
            node_order.push(seed.id.clone());
            nodes.insert(seed.id.clone(), seed);
        }

        let mut branches: HashMap<BranchId, Branch> = HashMap::new();
        let mut branch_order = Vec::new();
        for mut branch in document.branches {
            if branch.id.is_empty() || branches.contains_key(&branch.id) {
                let new_id = BranchId::generate();
                report.push(Repair::ReassignedBranchId {
                    old: branch.id.clone(),
                    new: new_id.clone(),
                });
                branch.id = new_id;
            }

            let before = branch.node_ids.len();
            branch.node_ids.retain(|id| nodes.contains_key(id));
            let removed = before - branch.node_ids.len();
            if removed > 0 {
                report.push(Repair::PrunedDanglingIds {
                    branch: branch.id.clone(),
                    removed,
                });
            }

            if !nodes.contains_key(&branch.root_node_id) {
                match branch.node_ids.first().cloned() {
                    Some(first) => {
                        report.push(Repair::MovedBranchRoot {
                            branch: branch.id.clone(),
                            root: first.clone(),
                        });
                        branch.root_node_id = first;
                    }
                    None => {
                        report.push(Repair::RemovedEmptyBranch(branch.id));
                        continue;
                    }
                }
            }

            branch_order.push(branch.id.clone());
            branches.insert(branch.id.clone(), branch);
        }

        if branches.is_empty() {
            let root = current_node_id
                .clone()
                .or_else(|| node_order.first().cloned())
                .unwrap_or_default();
            let branch = Branch::new(DEFAULT_BRANCH_NAME, root);
            report.push(Repair::CreatedDefaultBranch(branch.id.clone()));
            branch_order.push(branch.id.clone());
            branches.insert(branch.id.clone(), branch);
        }

        let current_branch_id = match document.current_branch_id {
            Some(id) if branches.contains_key(&id) => id,
            _ => {
                // branch_order is non-empty: a default branch was created above if needed
                let first = branch_order[0].clone();
                report.push(Repair::ResetActiveBranch(first.clone()));
                first
            }
        };

        for branch_id in &branch_order {
            let Some(branch) = branches.get_mut(branch_id) else {
                continue;
            };
            if !branch.node_ids.is_empty() {
                continue;
            }
            let fill = match &current_node_id {
                Some(active) if *branch_id == current_branch_id => active.clone(),
                _ => branch.root_node_id.clone(),
            };
            branch.node_ids.push(fill);
            report.push(Repair::FilledEmptyBranch(branch_id.clone()));
        }

        let active_branch = &branches[&current_branch_id];
        let current_node_id = match current_node_id {
            Some(id) if active_branch.contains(&id) => id,
            _ => {
                let tip = active_branch
                    .tip()
                    .cloned()
                    .unwrap_or_else(|| active_branch.root_node_id.clone());
                report.push(Repair::ResetActiveNode(tip.clone()));
                tip
            }
        };

        let state = TreeState::from_parts(
            document.title,
            nodes,
            node_order,
            branches,
            branch_order,
            current_branch_id,
            current_node_id,
        );
        (state, report)
    }
}
