//! Per-node conversation histories.
//!
//! Each node owns one append-only list of messages. Turns alternate
//! user/assistant starting with a user turn; the dispatcher guarantees this by
//! construction (one outstanding request per node), so the store only checks
//! it with debug assertions.
//!
//! # Concurrency Model
//!
//! - DashMap for per-node concurrent access
//! - No lock is ever held across an await: callers copy out what they need

use std::sync::Arc;

use dashmap::DashMap;

use branchchat_types::{Message, NodeId};

use crate::graph::GraphError;

/// Thread-safe handle to a ConversationStore.
/// With DashMap, the store itself doesn't need RwLock.
pub type SharedConversationStore = Arc<ConversationStore>;

/// Create a new shared conversation store.
pub fn shared_conversation_store() -> SharedConversationStore {
    Arc::new(ConversationStore::new())
}

/// Store mapping each node to its ordered message history.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: DashMap<NodeId, Vec<Message>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one empty conversation, for the root node.
    pub fn with_root(root: NodeId) -> Self {
        let conversations = DashMap::new();
        conversations.insert(root, Vec::new());
        Self { conversations }
    }

    /// Create an empty conversation for a freshly created node.
    pub fn create(&self, node: NodeId) -> Result<(), GraphError> {
        use dashmap::mapref::entry::Entry;
        match self.conversations.entry(node) {
            Entry::Occupied(_) => Err(GraphError::DuplicateId(node)),
            Entry::Vacant(slot) => {
                slot.insert(Vec::new());
                Ok(())
            }
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.conversations.contains_key(&node)
    }

    /// Append a user turn. Returns the history length before the append.
    pub fn append_user(&self, node: NodeId, content: impl Into<String>) -> Result<usize, GraphError> {
        let mut history = self
            .conversations
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode(node))?;
        let before = history.len();
        if history.last().is_some_and(|m| m.is_user()) {
            tracing::error!(%node, "user turn appended while a reply is outstanding");
            debug_assert!(false, "user turn appended to {node} while a reply is outstanding");
        }
        history.push(Message::user(content));
        Ok(before)
    }

    /// Append an assistant turn replying to the preceding user turn.
    pub fn append_assistant(&self, node: NodeId, content: impl Into<String>) -> Result<(), GraphError> {
        let mut history = self
            .conversations
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode(node))?;
        if !history.last().is_some_and(|m| m.is_user()) {
            tracing::error!(%node, "assistant turn appended without a preceding user turn");
            debug_assert!(false, "assistant turn appended to {node} without a preceding user turn");
        }
        history.push(Message::assistant(content));
        Ok(())
    }

    /// Snapshot of a node's history.
    pub fn history(&self, node: NodeId) -> Option<Vec<Message>> {
        self.conversations.get(&node).map(|h| h.clone())
    }

    /// Number of turns in a node's history.
    pub fn len(&self, node: NodeId) -> Option<usize> {
        self.conversations.get(&node).map(|h| h.len())
    }

    /// Number of conversations held.
    pub fn count(&self) -> usize {
        self.conversations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchchat_types::Role;

    #[test]
    fn test_create_is_empty_and_unique() {
        let store = ConversationStore::new();
        let node = NodeId::new();
        store.create(node).unwrap();
        assert_eq!(store.len(node), Some(0));
        assert_eq!(store.create(node), Err(GraphError::DuplicateId(node)));
    }

    #[test]
    fn test_append_alternates() {
        let store = ConversationStore::new();
        let node = NodeId::root();
        store.create(node).unwrap();

        assert_eq!(store.append_user(node, "Explain entropy").unwrap(), 0);
        store.append_assistant(node, "Entropy measures disorder.").unwrap();
        assert_eq!(store.append_user(node, "More?").unwrap(), 2);

        let history = store.history(node).unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(history[1].content, "Entropy measures disorder.");
    }

    #[test]
    fn test_unknown_node() {
        let store = ConversationStore::new();
        let ghost = NodeId::new();
        assert_eq!(store.append_user(ghost, "hi"), Err(GraphError::UnknownNode(ghost)));
        assert!(store.history(ghost).is_none());
        assert!(store.len(ghost).is_none());
    }

    #[test]
    fn test_conversations_are_independent() {
        let store = ConversationStore::new();
        let a = NodeId::new();
        let b = NodeId::new();
        store.create(a).unwrap();
        store.create(b).unwrap();
        store.append_user(a, "only in a").unwrap();
        assert_eq!(store.len(a), Some(1));
        assert_eq!(store.len(b), Some(0));
        assert_eq!(store.count(), 2);
    }
}
