//! Navigation state: the active node and the side panel.
//!
//! `SessionState` is an immutable value; every transition is a pure function
//! from one state to the next ([`SessionState::reduce`]). The
//! `SessionController` holds the current value and checks node existence
//! against the graph before applying a transition.
//!
//! ```text
//!             open_side_panel(n, p)
//!   ┌────────────┐ ───────────────▶ ┌──────────────────────┐
//!   │ active = a │                  │ active = a, panel = n│
//!   │ panel = ∅  │ ◀─────────────── └──────────────────────┘
//!   └────────────┘  close_side_panel         │ promote_side_panel
//!         ▲                                  ▼
//!         └──────────────────────────  active = n, panel = ∅
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use branchchat_types::NodeId;

use crate::graph::{GraphError, SharedGraphStore};

/// A just-created branch shown next to the active conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePanel {
    /// The branch node.
    pub node: NodeId,
    /// The node it was branched from.
    pub parent: NodeId,
}

/// Transition requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Make a node the active conversation.
    Focus(NodeId),
    /// Show a freshly created branch in the side panel.
    OpenSidePanel { node: NodeId, parent: NodeId },
    /// Dismiss the side panel.
    CloseSidePanel,
    /// Make the side panel branch active and dismiss the panel.
    PromoteSidePanel,
}

/// Which node is active and which, if any, is in the side panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub active: NodeId,
    pub side_panel: Option<SidePanel>,
}

impl SessionState {
    /// Initial state: `active` focused, no side panel.
    pub fn new(active: NodeId) -> Self {
        Self {
            active,
            side_panel: None,
        }
    }

    /// Apply a transition. Pure: no validation, no side effects.
    pub fn reduce(self, action: SessionAction) -> Self {
        match action {
            SessionAction::Focus(node) => Self {
                active: node,
                ..self
            },
            SessionAction::OpenSidePanel { node, parent } => Self {
                side_panel: Some(SidePanel { node, parent }),
                ..self
            },
            SessionAction::CloseSidePanel => Self {
                side_panel: None,
                ..self
            },
            SessionAction::PromoteSidePanel => match self.side_panel {
                Some(panel) => Self {
                    active: panel.node,
                    side_panel: None,
                },
                None => self,
            },
        }
    }
}

/// Holds the current session state and validates transitions.
#[derive(Debug)]
pub struct SessionController {
    state: RwLock<SessionState>,
    graph: SharedGraphStore,
}

impl SessionController {
    /// Start with `active` focused.
    pub fn new(graph: SharedGraphStore, active: NodeId) -> Self {
        Self {
            state: RwLock::new(SessionState::new(active)),
            graph,
        }
    }

    /// Current state (copied out).
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn active(&self) -> NodeId {
        self.state.read().active
    }

    pub fn side_panel(&self) -> Option<SidePanel> {
        self.state.read().side_panel
    }

    /// Apply `action` after checking the nodes it names exist.
    ///
    /// Returns the state before and after the transition.
    pub fn apply(&self, action: SessionAction) -> Result<(SessionState, SessionState), GraphError> {
        {
            let graph = self.graph.read();
            match action {
                SessionAction::Focus(node) if !graph.contains(node) => {
                    return Err(GraphError::UnknownNode(node));
                }
                SessionAction::OpenSidePanel { node, parent } => {
                    if !graph.contains(parent) {
                        return Err(GraphError::UnknownParent(parent));
                    }
                    if !graph.contains(node) {
                        return Err(GraphError::UnknownNode(node));
                    }
                }
                _ => {}
            }
        }

        let mut state = self.state.write();
        let before = *state;
        *state = before.reduce(action);
        tracing::debug!(?action, active = %state.active, "session transition");
        Ok((before, *state))
    }

    /// Make `node` active.
    pub fn focus_node(&self, node: NodeId) -> Result<(), GraphError> {
        self.apply(SessionAction::Focus(node)).map(|_| ())
    }

    /// Show `node` (branched from `parent`) in the side panel.
    pub fn open_side_panel(&self, node: NodeId, parent: NodeId) -> Result<(), GraphError> {
        self.apply(SessionAction::OpenSidePanel { node, parent })
            .map(|_| ())
    }

    /// Dismiss the side panel. Returns the branch that was showing.
    pub fn close_side_panel(&self) -> Option<SidePanel> {
        let mut state = self.state.write();
        let closed = state.side_panel;
        *state = state.reduce(SessionAction::CloseSidePanel);
        closed
    }

    /// Activate the side panel branch and dismiss the panel in one step.
    ///
    /// Returns the newly active node, or `None` if no panel was open.
    pub fn promote_side_panel(&self) -> Option<NodeId> {
        let mut state = self.state.write();
        let promoted = state.side_panel.map(|p| p.node);
        *state = state.reduce(SessionAction::PromoteSidePanel);
        promoted
    }
}
