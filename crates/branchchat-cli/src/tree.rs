//! Graph visualization as ASCII tree.
//!
//! Provides functions to format a `GraphSnapshot` as a human-readable tree.

use std::collections::HashMap;

use branchchat_kernel::GraphSnapshot;
use branchchat_types::NodeId;

/// Format a snapshot as ASCII tree lines, root first.
///
/// The active node is marked `*`, the side panel branch `»`, and nodes
/// waiting on a reply end with `…`.
pub fn format_graph_tree(snapshot: &GraphSnapshot, max_depth: Option<u32>) -> Vec<String> {
    let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in &snapshot.edges {
        children.entry(edge.from).or_default().push(edge.to);
    }

    let mut lines = Vec::new();
    let roots: Vec<NodeId> = snapshot
        .nodes
        .iter()
        .filter(|n| !snapshot.edges.iter().any(|e| e.to == n.id))
        .map(|n| n.id)
        .collect();
    for (idx, root) in roots.iter().enumerate() {
        let is_last_root = idx == roots.len() - 1;
        format_graph_node(snapshot, &children, *root, 0, "", is_last_root, max_depth, &mut lines);
    }
    lines
}

#[allow(clippy::too_many_arguments)]
fn format_graph_node(
    snapshot: &GraphSnapshot,
    children: &HashMap<NodeId, Vec<NodeId>>,
    id: NodeId,
    depth: usize,
    prefix: &str,
    is_last: bool,
    max_depth: Option<u32>,
    lines: &mut Vec<String>,
) {
    if let Some(max) = max_depth
        && depth as u32 > max
    {
        return;
    }
    let Some(node) = snapshot.nodes.iter().find(|n| n.id == id) else {
        return;
    };

    let connector = if depth == 0 {
        ""
    } else if is_last {
        "└─ "
    } else {
        "├─ "
    };

    let marker = if snapshot.session.active == id {
        "* "
    } else if snapshot.session.side_panel.is_some_and(|p| p.node == id) {
        "» "
    } else {
        "  "
    };
    let loading = if snapshot.loading.contains(&id) { " …" } else { "" };

    lines.push(format!(
        "{prefix}{connector}{marker}{} ({}){loading}",
        summarize(&node.label, 40),
        id.short()
    ));

    let kids = children.get(&id).map(Vec::as_slice).unwrap_or_default();
    let child_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}   ")
    } else {
        format!("{prefix}│  ")
    };
    for (i, child) in kids.iter().enumerate() {
        let is_last_child = i == kids.len() - 1;
        format_graph_node(snapshot, children, *child, depth + 1, &child_prefix, is_last_child, max_depth, lines);
    }
}

/// First line of `text`, cut to `max_chars` with an ellipsis.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchchat_kernel::{SessionState, SidePanel};
    use branchchat_types::{Edge, Node, Position};

    fn snapshot() -> (GraphSnapshot, NodeId, NodeId, NodeId) {
        let root = Node::root("Explain entropy", Position::new(100.0, 300.0));
        let a = Node::sub("heat death", Position::new(100.0, 450.0));
        let b = Node::sub("microstates", Position::new(220.0, 450.0));
        let c = Node::sub("Boltzmann", Position::new(220.0, 600.0));
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let snapshot = GraphSnapshot {
            edges: vec![
                Edge::sub(root.id, a_id),
                Edge::sub(root.id, b_id),
                Edge::sub(b_id, c_id),
            ],
            nodes: vec![root, a, b, c],
            session: SessionState {
                active: NodeId::root(),
                side_panel: Some(SidePanel { node: c_id, parent: b_id }),
            },
            loading: vec![c_id],
        };
        (snapshot, a_id, b_id, c_id)
    }

    #[test]
    fn test_tree_shape() {
        let (snapshot, a, b, c) = snapshot();
        let lines = format_graph_tree(&snapshot, None);
        assert_eq!(
            lines,
            vec![
                format!("* Explain entropy ({})", NodeId::root().short()),
                format!("├─   heat death ({})", a.short()),
                format!("└─   microstates ({})", b.short()),
                format!("   └─ » Boltzmann ({}) …", c.short()),
            ]
        );
    }

    #[test]
    fn test_max_depth() {
        let (snapshot, ..) = snapshot();
        assert_eq!(format_graph_tree(&snapshot, Some(0)).len(), 1);
        assert_eq!(format_graph_tree(&snapshot, Some(1)).len(), 3);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("short", 40), "short");
        assert_eq!(summarize("line one\nline two", 40), "line one");
        assert_eq!(summarize("abcdefghij", 6), "abc...");
    }
}
