//! Terminal rendering.

use branch_tree::{BranchSummary, Node, NodeId};
use colored::Colorize;
use conversation_store::ConversationSummary;

const SHORT_ID: usize = 8;

pub fn short(id: &str) -> &str {
    id.get(..SHORT_ID).unwrap_or(id)
}

pub fn conversations(summaries: &[ConversationSummary]) {
    if summaries.is_empty() {
        println!("{}", "No conversations yet. Create one with `echotrace new`.".dimmed());
        return;
    }
    for summary in summaries {
        println!("{}  {}", summary.id.as_str().yellow(), summary.title);
    }
}

pub fn timeline(title: &str, branch_name: &str, nodes: &[Node], current: &NodeId) {
    println!("{} {}", title.bold(), format!("[{branch_name}]").cyan());
    println!();
    for (position, node) in nodes.iter().enumerate() {
        exchange(position, node, node.id == *current);
    }
}

pub fn exchange(position: usize, node: &Node, is_current: bool) {
    let marker = if is_current { "*" } else { " " };
    println!(
        "{} {} {}",
        marker.green().bold(),
        format!("#{position}").dimmed(),
        short(node.id.as_str()).yellow()
    );
    if let Some(user_msg) = node.user_msg.as_deref() {
        println!("  {} {}", "You:".cyan().bold(), user_msg);
    }
    if let Some(ai_msg) = node.ai_msg.as_deref() {
        println!("  {} {}", "Assistant:".green().bold(), ai_msg);
    }
    if !node.annotations.is_empty() {
        println!("  {} {}", "Note:".magenta(), node.annotations.dimmed());
    }
    println!();
}

pub fn branches(summaries: &[BranchSummary]) {
    for branch in summaries {
        let marker = if branch.is_active { "*" } else { " " };
        println!(
            "{} {}  {}  {} from {}, tip {}",
            marker.green().bold(),
            short(branch.id.as_str()).yellow(),
            branch.name.bold(),
            format!("{} exchanges", branch.length).dimmed(),
            short(branch.root_node_id.as_str()),
            short(branch.tip_node_id.as_str()),
        );
    }
}

pub fn success(message: impl AsRef<str>) {
    println!("{} {}", "✓".green().bold(), message.as_ref());
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("{} {}", "✗".red().bold(), message.as_ref().red());
}

#[cfg(test)]
mod tests {
    use super::short;

    #[test]
    fn short_ids_truncate_only_long_values() {
        assert_eq!(short("0123456789abcdef"), "01234567");
        assert_eq!(short("abc"), "abc");
    }
}
