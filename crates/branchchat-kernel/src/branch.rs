//! Branch creation: spinning a deep-dive conversation off highlighted text.
//!
//! # Flow
//!
//! ```text
//! create_branch(parent, "gravity")
//!       │
//!       ▼  graph write lock held for placement + insert
//! position = compute_branch_position(parent)
//! add_node(Sub "gravity") + add_edge(parent → new, Sub)
//!       │
//!       ▼
//! empty conversation ──▶ side panel = {new, parent}
//!       │
//!       ▼  spawned, caller does not wait
//! send_message(new, "What is gravity?")
//! ```

use tokio::task::JoinHandle;

use branchchat_types::{Edge, Node, NodeId, Position};

use crate::conversation::SharedConversationStore;
use crate::dispatch::{MessageDispatcher, SendOutcome};
use crate::flows::{KernelFlow, SharedKernelFlowBus};
use crate::graph::{GraphError, SharedGraphStore};
use crate::session::SessionController;

use std::sync::Arc;

/// The synthetic first question asked in a new branch.
pub fn first_question(selected_text: &str) -> String {
    format!("What is {selected_text}?")
}

/// Errors from branch creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchError {
    #[error("cannot branch from an empty selection")]
    EmptySelection,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A freshly created branch.
#[derive(Debug)]
pub struct Branch {
    /// The new node.
    pub node: NodeId,
    /// The node it was branched from.
    pub parent: NodeId,
    /// Where it was placed.
    pub position: Position,
    /// The in-flight first exchange. Dropping the handle does not cancel it;
    /// aborting it records the fallback reply.
    pub first_exchange: JoinHandle<Result<SendOutcome, GraphError>>,
}

/// Creates branch nodes and kicks off their first exchange.
pub struct BranchManager {
    graph: SharedGraphStore,
    conversations: SharedConversationStore,
    session: Arc<SessionController>,
    dispatcher: MessageDispatcher,
    flows: SharedKernelFlowBus,
}

impl std::fmt::Debug for BranchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchManager")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl BranchManager {
    pub fn new(
        graph: SharedGraphStore,
        conversations: SharedConversationStore,
        session: Arc<SessionController>,
        dispatcher: MessageDispatcher,
        flows: SharedKernelFlowBus,
    ) -> Self {
        Self {
            graph,
            conversations,
            session,
            dispatcher,
            flows,
        }
    }

    /// Branch off `parent` from `selected_text`.
    ///
    /// Must be called from within a tokio runtime: the first exchange runs on
    /// a spawned task.
    #[tracing::instrument(skip(self, selected_text), fields(parent = %parent), name = "branch.create")]
    pub fn create_branch(&self, parent: NodeId, selected_text: &str) -> Result<Branch, BranchError> {
        if selected_text.trim().is_empty() {
            return Err(BranchError::EmptySelection);
        }

        // Placement and insertion under one lock so concurrent branches off
        // the same parent get distinct sibling slots.
        let node = {
            let mut graph = self.graph.write();
            let position = graph.compute_branch_position(parent)?;
            let node = Node::sub(selected_text, position);
            graph.add_node(node.clone())?;
            graph.add_edge(Edge::sub(parent, node.id))?;
            node
        };

        self.conversations.create(node.id)?;
        self.flows.publish(KernelFlow::NodeCreated {
            node: node.id,
            parent: Some(parent),
            kind: node.kind,
            label: node.label.clone(),
        });

        self.session.open_side_panel(node.id, parent)?;
        self.flows.publish(KernelFlow::PanelOpened {
            node: node.id,
            parent,
        });

        tracing::info!(node = %node.id, label = %node.label, x = node.position.x, y = node.position.y, "branch created");

        let dispatcher = self.dispatcher.clone();
        let question = first_question(selected_text);
        let id = node.id;
        let first_exchange = tokio::spawn(async move { dispatcher.send_message(id, &question).await });

        Ok(Branch {
            node: node.id,
            parent,
            position: node.position,
            first_exchange,
        })
    }
}
