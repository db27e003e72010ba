//! Graph node and edge types.
//!
//! A `Node` is one conversation thread placed on the canvas. Lineage is not
//! stored on the node: the parent relationship lives only in the `Edge` list,
//! and the graph store derives children and parents by filtering edges.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::NodeId;

/// Maximum number of characters kept in a node label.
pub const LABEL_MAX_CHARS: usize = 40;

/// Truncate text to a node label: the first [`LABEL_MAX_CHARS`] characters.
///
/// Counts Unicode scalar values, so multi-byte text is never split mid-char.
pub fn truncate_label(text: &str) -> String {
    text.chars().take(LABEL_MAX_CHARS).collect()
}

/// What kind of conversation a node holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum NodeKind {
    /// The single starting conversation, created at initialization.
    Root,
    /// Main follow-up thread. Reserved: nothing produces it yet.
    Main,
    /// Deep-dive branch spawned from highlighted text.
    Sub,
}

impl NodeKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Main => "main",
            NodeKind::Sub => "sub",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of parent → child relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EdgeKind {
    /// Main follow-up edge. Reserved: nothing produces it yet.
    Main,
    /// Deep-dive edge.
    Sub,
}

impl EdgeKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Main => "main",
            EdgeKind::Sub => "sub",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canvas position of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// This position shifted by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// A conversation node on the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique, immutable identifier.
    pub id: NodeId,
    /// Display label. Overwritten once, on the node's first user message.
    pub label: String,
    /// Canvas position, fixed at creation.
    pub position: Position,
    /// Root, main follow-up, or deep-dive.
    pub kind: NodeKind,
}

impl Node {
    /// The root node at `position` with a placeholder label.
    pub fn root(label: impl Into<String>, position: Position) -> Self {
        Self {
            id: NodeId::root(),
            label: label.into(),
            position,
            kind: NodeKind::Root,
        }
    }

    /// A fresh deep-dive node labelled from the highlighted text.
    pub fn sub(selected_text: &str, position: Position) -> Self {
        Self {
            id: NodeId::new(),
            label: truncate_label(selected_text),
            position,
            kind: NodeKind::Sub,
        }
    }

    pub fn is_root(&self) -> bool {
        self.kind == NodeKind::Root
    }

    /// Display string: label if present, otherwise short hex ID.
    pub fn display_name(&self) -> String {
        self.id.display_or(Some(&self.label))
    }
}

/// Directed parent → child relationship. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Self { from, to, kind }
    }

    /// A deep-dive edge.
    pub fn sub(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, EdgeKind::Sub)
    }
}
