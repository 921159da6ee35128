//! In-memory node/branch universe of one conversation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::document::{resolve_title, ConversationDocument};
use crate::error::{Result, TreeError};
use crate::ids::{BranchId, ConversationId, NodeId};
use crate::node::Node;
use crate::patch::NodePatch;

/// Display summary of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub id: BranchId,
    pub name: String,
    pub root_node_id: NodeId,
    pub tip_node_id: NodeId,
    pub length: usize,
    pub is_active: bool,
}

/// The healed tree of one conversation.
///
/// Only obtainable through [`TreeState::heal`] (or [`TreeState::new`]), so
/// every value upholds the structural invariants: at least one node and one
/// branch, valid active pointers, and no branch referencing a missing node.
/// Every operation either succeeds completely or leaves the state untouched.
#[derive(Debug, Clone)]
pub struct TreeState {
    title: Option<String>,
    nodes: HashMap<NodeId, Node>,
    node_order: Vec<NodeId>,
    branches: HashMap<BranchId, Branch>,
    branch_order: Vec<BranchId>,
    current_branch_id: BranchId,
    current_node_id: NodeId,
}

impl Default for TreeState {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeState {
    /// A fresh conversation: one seed node on a `main` branch.
    pub fn new() -> Self {
        Self::heal(ConversationDocument::default()).0
    }

    pub(crate) fn from_parts(
        title: Option<String>,
        nodes: HashMap<NodeId, Node>,
        node_order: Vec<NodeId>,
        branches: HashMap<BranchId, Branch>,
        branch_order: Vec<BranchId>,
        current_branch_id: BranchId,
        current_node_id: NodeId,
    ) -> Self {
        Self {
            title,
            nodes,
            node_order,
            branches,
            branch_order,
            current_branch_id,
            current_node_id,
        }
    }

    pub fn to_document(&self) -> ConversationDocument {
        ConversationDocument {
            title: self.title.clone(),
            nodes: self.nodes().cloned().collect(),
            branches: self.branches().cloned().collect(),
            current_node_id: Some(self.current_node_id.clone()),
            current_branch_id: Some(self.current_branch_id.clone()),
        }
    }

    /// Appends a new exchange to the active branch and makes it the active tip.
    ///
    /// `parent_id` is recorded for provenance only and is not validated.
    pub fn add_exchange(
        &mut self,
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> Result<Node> {
        let branch_id = self.current_branch_id.clone();
        self.append_exchange(&branch_id, user_msg, ai_msg, parent_id)
    }

    /// Appends a new exchange to `branch_id`, which need not be active.
    ///
    /// The active tip moves only when `branch_id` is the active branch.
    pub fn append_exchange(
        &mut self,
        branch_id: &BranchId,
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<NodeId>,
    ) -> Result<Node> {
        if !self.branches.contains_key(branch_id) {
            return Err(TreeError::branch_not_found(branch_id));
        }

        let mut node = Node::new(user_msg, ai_msg, parent_id);
        while self.nodes.contains_key(&node.id) {
            node.id = NodeId::generate();
        }

        if let Some(branch) = self.branches.get_mut(branch_id) {
            branch.node_ids.push(node.id.clone());
        }
        self.node_order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node.clone());
        if *branch_id == self.current_branch_id {
            self.current_node_id = node.id.clone();
        }

        tracing::debug!(
            node_id = %node.id,
            branch_id = %branch_id,
            "TreeState: exchange appended"
        );

        Ok(node)
    }

    /// Forks a new branch from `from_node_id`, which must belong to the
    /// active branch. The new branch owns a copy of the active history up to
    /// and including the fork point and becomes active.
    pub fn fork_branch(&mut self, name: impl Into<String>, from_node_id: &NodeId) -> Result<Branch> {
        let active = self
            .branches
            .get(&self.current_branch_id)
            .ok_or_else(|| TreeError::branch_not_found(&self.current_branch_id))?;
        let position = active
            .position_of(from_node_id)
            .ok_or_else(|| TreeError::node_not_found(from_node_id))?;

        let history = active.node_ids[..=position].to_vec();
        let mut branch = Branch::with_history(name, from_node_id.clone(), history);
        while self.branches.contains_key(&branch.id) {
            branch.id = BranchId::generate();
        }

        tracing::info!(
            parent_branch_id = %self.current_branch_id,
            branch_id = %branch.id,
            from_node_id = %from_node_id,
            history_len = branch.node_ids.len(),
            "TreeState: branch forked"
        );

        self.branch_order.push(branch.id.clone());
        self.branches.insert(branch.id.clone(), branch.clone());
        self.current_branch_id = branch.id.clone();
        self.current_node_id = from_node_id.clone();

        Ok(branch)
    }

    /// Makes `branch_id` active with its last node as the active tip.
    pub fn switch_branch(&mut self, branch_id: &BranchId) -> Result<()> {
        let branch = self
            .branches
            .get(branch_id)
            .ok_or_else(|| TreeError::branch_not_found(branch_id))?;
        let tip = branch
            .tip()
            .cloned()
            .ok_or_else(|| TreeError::branch_not_found(branch_id))?;

        self.current_branch_id = branch_id.clone();
        self.current_node_id = tip;
        Ok(())
    }

    pub fn update_node(&mut self, node_id: &NodeId, patch: NodePatch) -> Result<Node> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeError::node_not_found(node_id))?;
        patch.apply_to(node);
        Ok(node.clone())
    }

    pub fn rename_branch(&mut self, branch_id: &BranchId, name: impl Into<String>) -> Result<Branch> {
        let branch = self
            .branches
            .get_mut(branch_id)
            .ok_or_else(|| TreeError::branch_not_found(branch_id))?;
        branch.name = name.into();
        Ok(branch.clone())
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    /// The ordered nodes of `branch_id`, or of the active branch when `None`.
    pub fn timeline(&self, branch_id: Option<&BranchId>) -> Result<Vec<&Node>> {
        let branch_id = branch_id.unwrap_or(&self.current_branch_id);
        let branch = self
            .branches
            .get(branch_id)
            .ok_or_else(|| TreeError::branch_not_found(branch_id))?;
        branch
            .node_ids
            .iter()
            .map(|id| self.nodes.get(id).ok_or_else(|| TreeError::node_not_found(id)))
            .collect()
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn branch(&self, branch_id: &BranchId) -> Option<&Branch> {
        self.branches.get(branch_id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Branches in creation order.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.branch_order.iter().filter_map(|id| self.branches.get(id))
    }

    pub fn branch_summaries(&self) -> Vec<BranchSummary> {
        self.branches()
            .map(|branch| BranchSummary {
                id: branch.id.clone(),
                name: branch.name.clone(),
                root_node_id: branch.root_node_id.clone(),
                tip_node_id: branch
                    .tip()
                    .cloned()
                    .unwrap_or_else(|| branch.root_node_id.clone()),
                length: branch.node_ids.len(),
                is_active: branch.id == self.current_branch_id,
            })
            .collect()
    }

    /// The active branch. Always present in a healed state.
    pub fn current_branch(&self) -> &Branch {
        &self.branches[&self.current_branch_id]
    }

    pub fn current_branch_id(&self) -> &BranchId {
        &self.current_branch_id
    }

    pub fn current_node_id(&self) -> &NodeId {
        &self.current_node_id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// See [`ConversationDocument::display_title`].
    pub fn display_title(&self, id: &ConversationId) -> String {
        let first_user_msg = self.nodes().next().and_then(|node| node.user_msg.as_deref());
        resolve_title(self.title(), first_user_msg, id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Describes every broken structural invariant; empty for a valid tree.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.nodes.is_empty() {
            violations.push("no nodes".to_string());
        }
        if self.branches.is_empty() {
            violations.push("no branches".to_string());
        }

        match self.branches.get(&self.current_branch_id) {
            None => violations.push(format!(
                "active branch {} does not exist",
                self.current_branch_id
            )),
            Some(branch) if !branch.contains(&self.current_node_id) => violations.push(format!(
                "active node {} is not in active branch {}",
                self.current_node_id, self.current_branch_id
            )),
            Some(_) => {}
        }

        for branch in self.branches() {
            if branch.node_ids.is_empty() {
                violations.push(format!("branch {} has no nodes", branch.id));
            }
            if !self.nodes.contains_key(&branch.root_node_id) {
                violations.push(format!(
                    "branch {} root {} does not exist",
                    branch.id, branch.root_node_id
                ));
            }
            for id in &branch.node_ids {
                if !self.nodes.contains_key(id) {
                    violations.push(format!("branch {} references missing node {id}", branch.id));
                }
            }
        }

        violations
    }
}
