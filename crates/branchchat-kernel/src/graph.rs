//! Conversation graph — nodes, parent → child edges, and branch placement.
//!
//! The GraphStore is the single source of truth for which conversation nodes
//! exist and how they relate. Nodes are kept in insertion order; edges in a
//! flat list. Children and parents are computed by filtering edges rather than
//! stored on the nodes.
//!
//! # Placement
//!
//! ```text
//!            parent (x, y)
//!       ┌────────┼──────────┐
//!       ▼        ▼          ▼
//!   (x, y+150) (x+120, y+150) (x+240, y+150)   ← k-th Sub child at x + k·120
//! ```
//!
//! Subtrees of different parents may overlap on the canvas; nothing corrects it.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use branchchat_types::{Edge, EdgeKind, Node, NodeId, Position};

/// Horizontal distance between consecutive deep-dive siblings.
pub const BRANCH_SPACING_X: f64 = 120.0;

/// Vertical drop from a parent to its deep-dive children.
pub const BRANCH_DROP_Y: f64 = 150.0;

/// Canvas position of the root node.
pub const ROOT_POSITION: Position = Position { x: 100.0, y: 300.0 };

/// Shared, thread-safe GraphStore reference.
pub type SharedGraphStore = Arc<RwLock<GraphStore>>;

/// Create a new shared GraphStore.
pub fn shared_graph_store() -> SharedGraphStore {
    Arc::new(RwLock::new(GraphStore::new()))
}

/// Errors from graph operations.
///
/// All of these indicate misuse by the caller; none arise from user input
/// that has been validated upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateId(NodeId),
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("unknown parent: {0}")]
    UnknownParent(NodeId),
    #[error("node {0} already has a parent")]
    AlreadyLinked(NodeId),
}

/// Nodes and edges of the conversation tree.
#[derive(Debug, Default)]
pub struct GraphStore {
    /// All nodes, in insertion order.
    nodes: IndexMap<NodeId, Node>,
    /// All edges, in insertion order. Append-only.
    edges: Vec<Edge>,
}

impl GraphStore {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph holding just the root node.
    pub fn with_root(root: Node) -> Self {
        let mut graph = Self::new();
        graph.nodes.insert(root.id, root);
        graph
    }

    /// Insert a node.
    #[tracing::instrument(skip(self, node), fields(node.id = %node.id, node.kind = %node.kind), name = "graph.add_node")]
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId(node.id));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Insert an edge between two existing nodes.
    ///
    /// The target must not be the root and must not already have a parent.
    #[tracing::instrument(skip(self), name = "graph.add_edge")]
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&edge.from) {
            return Err(GraphError::UnknownNode(edge.from));
        }
        let target = self
            .nodes
            .get(&edge.to)
            .ok_or(GraphError::UnknownNode(edge.to))?;
        if target.is_root() || self.parent_of(edge.to).is_some() {
            return Err(GraphError::AlreadyLinked(edge.to));
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Nodes one `kind` edge away from `id`, in edge insertion order.
    pub fn children_of(&self, id: NodeId, kind: EdgeKind) -> Vec<&Node> {
        self.edges
            .iter()
            .filter(|e| e.from == id && e.kind == kind)
            .filter_map(|e| self.nodes.get(&e.to))
            .collect()
    }

    /// The parent of `id`, if it has an incoming edge.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.edges.iter().find(|e| e.to == id).map(|e| e.from)
    }

    /// Walk the parent chain from `start` up to the root (inclusive).
    ///
    /// Returns an empty chain for an unknown node.
    pub fn lineage(&self, start: NodeId) -> Vec<&Node> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !seen.insert(id) {
                break; // cycle detected
            }
            match self.nodes.get(&id) {
                Some(node) => {
                    chain.push(node);
                    current = self.parent_of(id);
                }
                None => break,
            }
        }
        chain
    }

    /// Position for the next deep-dive child of `parent`.
    ///
    /// With `n` existing Sub children the new node lands at
    /// `(parent.x + n·120, parent.y + 150)`.
    pub fn compute_branch_position(&self, parent: NodeId) -> Result<Position, GraphError> {
        let parent_node = self
            .nodes
            .get(&parent)
            .ok_or(GraphError::UnknownParent(parent))?;
        let siblings = self.children_of(parent, EdgeKind::Sub).len();
        Ok(parent_node
            .position
            .offset(siblings as f64 * BRANCH_SPACING_X, BRANCH_DROP_Y))
    }

    /// Overwrite a node's label.
    #[tracing::instrument(skip(self, label), name = "graph.relabel")]
    pub fn relabel(&mut self, id: NodeId, label: String) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(GraphError::UnknownNode(id))?;
        node.label = label;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> GraphStore {
        GraphStore::with_root(Node::root("Start", ROOT_POSITION))
    }

    fn attach_sub(graph: &mut GraphStore, parent: NodeId, text: &str) -> NodeId {
        let pos = graph.compute_branch_position(parent).unwrap();
        let node = Node::sub(text, pos);
        let id = node.id;
        graph.add_node(node).unwrap();
        graph.add_edge(Edge::sub(parent, id)).unwrap();
        id
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut g = graph();
        let err = g.add_node(Node::root("again", ROOT_POSITION)).unwrap_err();
        assert_eq!(err, GraphError::DuplicateId(NodeId::root()));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_edge_requires_both_endpoints() {
        let mut g = graph();
        let ghost = NodeId::new();
        assert_eq!(
            g.add_edge(Edge::sub(NodeId::root(), ghost)),
            Err(GraphError::UnknownNode(ghost))
        );
        assert_eq!(
            g.add_edge(Edge::sub(ghost, NodeId::root())),
            Err(GraphError::UnknownNode(ghost))
        );
        assert!(g.edges().is_empty());
    }

    #[test]
    fn test_edge_into_root_rejected() {
        let mut g = graph();
        let child = attach_sub(&mut g, NodeId::root(), "child");
        assert_eq!(
            g.add_edge(Edge::sub(child, NodeId::root())),
            Err(GraphError::AlreadyLinked(NodeId::root()))
        );
    }

    #[test]
    fn test_second_parent_rejected() {
        let mut g = graph();
        let a = attach_sub(&mut g, NodeId::root(), "a");
        let b = attach_sub(&mut g, NodeId::root(), "b");
        assert_eq!(g.add_edge(Edge::sub(a, b)), Err(GraphError::AlreadyLinked(b)));
        assert_eq!(g.parent_of(b), Some(NodeId::root()));
    }

    #[test]
    fn test_sibling_placement_spreads_horizontally() {
        let mut g = graph();
        let root = ROOT_POSITION;
        for k in 0..4 {
            let id = attach_sub(&mut g, NodeId::root(), &format!("topic {k}"));
            let pos = g.node(id).unwrap().position;
            assert_eq!(pos.x, root.x + k as f64 * 120.0);
            assert_eq!(pos.y, root.y + 150.0);
        }
    }

    #[test]
    fn test_placement_counts_only_own_children() {
        let mut g = graph();
        let a = attach_sub(&mut g, NodeId::root(), "a");
        attach_sub(&mut g, NodeId::root(), "b");

        let a_pos = g.node(a).unwrap().position;
        let grandchild = attach_sub(&mut g, a, "deeper");
        assert_eq!(g.node(grandchild).unwrap().position, a_pos.offset(0.0, 150.0));
    }

    #[test]
    fn test_placement_unknown_parent() {
        let g = graph();
        let ghost = NodeId::new();
        assert_eq!(
            g.compute_branch_position(ghost),
            Err(GraphError::UnknownParent(ghost))
        );
    }

    #[test]
    fn test_children_in_insertion_order_and_by_kind() {
        let mut g = graph();
        let a = attach_sub(&mut g, NodeId::root(), "a");
        let b = attach_sub(&mut g, NodeId::root(), "b");
        let ids: Vec<NodeId> = g
            .children_of(NodeId::root(), EdgeKind::Sub)
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        assert!(g.children_of(NodeId::root(), EdgeKind::Main).is_empty());
    }

    #[test]
    fn test_lineage_walks_to_root() {
        let mut g = graph();
        let a = attach_sub(&mut g, NodeId::root(), "a");
        let b = attach_sub(&mut g, a, "b");
        let chain: Vec<NodeId> = g.lineage(b).iter().map(|n| n.id).collect();
        assert_eq!(chain, vec![b, a, NodeId::root()]);
        assert!(g.lineage(NodeId::new()).is_empty());
    }

    #[test]
    fn test_relabel() {
        let mut g = graph();
        g.relabel(NodeId::root(), "Explain entropy".into()).unwrap();
        assert_eq!(g.node(NodeId::root()).unwrap().label, "Explain entropy");
        let ghost = NodeId::new();
        assert_eq!(g.relabel(ghost, "x".into()), Err(GraphError::UnknownNode(ghost)));
    }
}
