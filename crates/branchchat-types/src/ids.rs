//! Typed identifier for conversation nodes.
//!
//! `NodeId` wraps a UUIDv7 (time-ordered, globally unique). It displays as
//! standard UUID text for logging. The `short()` form (first 8 hex chars) is
//! for human-facing output only and is never used as a lookup key.
//!
//! The root node has a deterministic sentinel via `NodeId::root()`, derived
//! from UUIDv5 so every process agrees on it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A conversation node identifier (UUIDv7, or UUIDv5 for the root).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(uuid::Uuid);

/// Fixed namespace for deriving the root sentinel via UUIDv5.
const BRANCHCHAT_NODE_NS: uuid::Uuid = uuid::uuid!("5b0f2d4e-91c3-4a7e-8d26-3f1e7c9a0b58");

impl NodeId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The well-known root node.
    ///
    /// Deterministic: same value every time (UUIDv5 derived from `b"root"`).
    pub fn root() -> Self {
        Self(uuid::Uuid::new_v5(&BRANCHCHAT_NODE_NS, b"root"))
    }

    /// Whether this is the root sentinel.
    pub fn is_root(&self) -> bool {
        *self == Self::root()
    }

    /// First 8 hex characters, for human display only.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Full 32-character hex string (no hyphens).
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }

    /// Prefer a label for display; fall back to short hex.
    pub fn display_or(&self, label: Option<&str>) -> String {
        match label {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => self.short(),
        }
    }

    /// Check if a query string matches this ID by hex prefix.
    pub fn matches_hex_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(prefix)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for NodeId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl From<NodeId> for uuid::Uuid {
    fn from(id: NodeId) -> uuid::Uuid {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full UUID with hyphens for log readability
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "NodeId(root)")
        } else {
            write!(f, "NodeId({})", self.short())
        }
    }
}

// ── Prefix resolution ───────────────────────────────────────────────────────

/// Error from node query resolution.
#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error("no node matches '{0}'")]
    NoMatch(String),
    #[error("ambiguous node query '{prefix}': matches {candidates:?}")]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },
}

/// Resolve a query string against a set of node IDs and their labels.
///
/// Resolution order:
/// 1. Exact label match (first wins, labels are not unique)
/// 2. Unique label prefix match
/// 3. Unique hex prefix match
/// 4. Error (no match or ambiguous)
pub fn resolve_node_prefix<'a>(
    nodes: impl Iterator<Item = (NodeId, &'a str)>,
    query: &str,
) -> Result<NodeId, PrefixError> {
    let entries: Vec<(NodeId, &str)> = nodes.collect();

    if let Some(&(id, _)) = entries.iter().find(|(_, label)| *label == query) {
        return Ok(id);
    }

    let label_matches: Vec<(NodeId, &str)> = entries
        .iter()
        .filter(|(_, label)| label.starts_with(query))
        .copied()
        .collect();

    if label_matches.len() == 1 {
        return Ok(label_matches[0].0);
    }
    if label_matches.len() > 1 {
        return Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: label_matches.iter().map(|(_, l)| l.to_string()).collect(),
        });
    }

    let hex_matches: Vec<NodeId> = entries
        .iter()
        .filter(|(id, _)| id.matches_hex_prefix(query))
        .map(|(id, _)| *id)
        .collect();

    match hex_matches.len() {
        0 => Err(PrefixError::NoMatch(query.to_string())),
        1 => Ok(hex_matches[0]),
        _ => Err(PrefixError::Ambiguous {
            prefix: query.to_string(),
            candidates: hex_matches.iter().map(|id| id.short()).collect(),
        }),
    }
}
