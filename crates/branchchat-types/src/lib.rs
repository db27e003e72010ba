//! Shared identity and data types for branchchat.
//!
//! This crate is the relational foundation: the typed node ID, graph nodes and
//! edges, and conversation messages. It has **no internal branchchat
//! dependencies** — a pure leaf crate that the kernel and front ends build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Node (NodeId) ← one conversation thread on the canvas
//!     └── kind: Root | Main | Sub
//!     └── owns a Conversation (ordered Messages, kept by the kernel)
//!
//! Edge (from → to) ← parent/child relationship, tagged Main | Sub
//!     └── every non-root node has exactly one incoming edge
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`NodeId`]        | Which conversation node                      |
//! | [`Node`]          | Label, position and kind of a node           |
//! | [`Edge`]          | Parent → child link                          |
//! | [`Message`]       | One user or assistant turn                   |
//! |-------------------|----------------------------------------------|

pub mod ids;
pub mod message;
pub mod node;

// Re-export primary types at crate root for convenience.
pub use ids::{NodeId, PrefixError, resolve_node_prefix};
pub use message::{Message, Role};
pub use node::{Edge, EdgeKind, LABEL_MAX_CHARS, Node, NodeKind, Position, truncate_label};
