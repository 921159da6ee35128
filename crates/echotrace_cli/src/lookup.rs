//! Resolves the short ids and names typed on the command line.

use anyhow::{anyhow, bail, Result};
use branch_tree::{BranchId, ConversationId, NodeId, TreeState};
use conversation_store::ConversationSummary;

struct Candidate<'a, T> {
    id: &'a str,
    name: Option<&'a str>,
    value: T,
}

/// Exact id, then exact name, then unique id prefix.
fn pick<T: Clone>(kind: &str, query: &str, candidates: &[Candidate<'_, T>]) -> Result<T> {
    let query = query.trim();
    if query.is_empty() {
        bail!("empty {kind} id");
    }
    if let Some(found) = candidates.iter().find(|c| c.id == query) {
        return Ok(found.value.clone());
    }

    let named: Vec<_> = candidates
        .iter()
        .filter(|c| c.name == Some(query))
        .collect();
    if let [only] = named.as_slice() {
        return Ok(only.value.clone());
    }
    if named.len() > 1 {
        bail!("{kind} name '{query}' is ambiguous, use an id");
    }

    let prefixed: Vec<_> = candidates
        .iter()
        .filter(|c| c.id.starts_with(query))
        .collect();
    match prefixed.as_slice() {
        [only] => Ok(only.value.clone()),
        [] => Err(anyhow!("no {kind} matches '{query}'")),
        _ => Err(anyhow!(
            "'{query}' matches {} {kind}s, type more characters",
            prefixed.len()
        )),
    }
}

pub fn conversation(summaries: &[ConversationSummary], query: &str) -> Result<ConversationId> {
    let candidates: Vec<_> = summaries
        .iter()
        .map(|summary| Candidate {
            id: summary.id.as_str(),
            name: Some(summary.title.as_str()),
            value: summary.id.clone(),
        })
        .collect();
    pick("conversation", query, &candidates)
}

pub fn branch(state: &TreeState, query: &str) -> Result<BranchId> {
    let candidates: Vec<_> = state
        .branches()
        .map(|branch| Candidate {
            id: branch.id.as_str(),
            name: Some(branch.name.as_str()),
            value: branch.id.clone(),
        })
        .collect();
    pick("branch", query, &candidates)
}

pub fn node(state: &TreeState, query: &str) -> Result<NodeId> {
    let candidates: Vec<_> = state
        .nodes()
        .map(|node| Candidate {
            id: node.id.as_str(),
            name: None,
            value: node.id.clone(),
        })
        .collect();
    pick("node", query, &candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, title: &str) -> ConversationSummary {
        ConversationSummary {
            id: ConversationId::from_raw(id),
            title: title.to_string(),
        }
    }

    #[test]
    fn conversation_by_id_title_or_prefix() {
        let summaries = vec![
            summary("conv_aaaa1111", "Groceries"),
            summary("conv_aaab2222", "Trip"),
        ];

        assert_eq!(
            conversation(&summaries, "conv_aaab2222").unwrap().as_str(),
            "conv_aaab2222"
        );
        assert_eq!(conversation(&summaries, "Trip").unwrap().as_str(), "conv_aaab2222");
        assert_eq!(conversation(&summaries, "conv_aaaa").unwrap().as_str(), "conv_aaaa1111");
        assert!(conversation(&summaries, "conv_aaa").is_err());
        assert!(conversation(&summaries, "conv_zzz").is_err());
    }

    #[test]
    fn branch_by_name_and_node_by_prefix() {
        let mut state = TreeState::new();
        let seed = state.current_node_id().clone();
        let alt = state.fork_branch("alt", &seed).unwrap();

        assert_eq!(branch(&state, "alt").unwrap(), alt.id);
        assert_eq!(node(&state, &seed.as_str()[..8]).unwrap(), seed);
        assert!(node(&state, "").is_err());
    }
}
