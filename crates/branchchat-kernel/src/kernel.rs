//! The Kernel: one branching learning session.
//!
//! A kernel owns:
//! - The node graph (root plus every branch)
//! - One conversation per node
//! - Session state (active node, side panel)
//! - A completion service, shared by dispatch and tooltips
//! - A FlowBus that announces every change
//!
//! It is `Send + Sync` and meant to be shared as `Arc<Kernel>`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use branchchat_types::{Edge, Message, Node, NodeId, PrefixError, resolve_node_prefix};

use crate::branch::{Branch, BranchError, BranchManager};
use crate::config::KernelConfig;
use crate::conversation::{ConversationStore, SharedConversationStore};
use crate::dispatch::{MessageDispatcher, SendOutcome};
use crate::flows::{
    DEFAULT_FLOW_CAPACITY, KernelFlow, SharedKernelFlowBus, Subscription, shared_kernel_flow_bus,
};
use crate::graph::{GraphError, GraphStore, ROOT_POSITION, SharedGraphStore};
use crate::llm::{CompletionService, HttpCompletionService};
use crate::session::{SessionController, SessionState, SidePanel};
use crate::tooltip::TooltipCache;

/// Serializable view of everything the visual surface draws.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub session: SessionState,
    /// Nodes with a request outstanding.
    pub loading: Vec<NodeId>,
}

/// The Kernel.
pub struct Kernel {
    config: KernelConfig,
    graph: SharedGraphStore,
    conversations: SharedConversationStore,
    session: Arc<SessionController>,
    dispatcher: MessageDispatcher,
    branches: BranchManager,
    tooltips: TooltipCache,
    flows: SharedKernelFlowBus,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("nodes", &self.graph.read().len())
            .field("session", &self.session.state())
            .field("dispatcher", &self.dispatcher)
            .field("tooltips", &self.tooltips)
            .finish()
    }
}

impl Kernel {
    /// Create a kernel with a single root node focused and no side panel.
    pub fn new(config: KernelConfig, service: Arc<dyn CompletionService>) -> Self {
        let root = Node::root(config.root_label.clone(), ROOT_POSITION);
        let graph: SharedGraphStore = Arc::new(RwLock::new(GraphStore::with_root(root)));
        let conversations: SharedConversationStore =
            Arc::new(ConversationStore::with_root(NodeId::root()));
        let session = Arc::new(SessionController::new(graph.clone(), NodeId::root()));
        let flows = shared_kernel_flow_bus(DEFAULT_FLOW_CAPACITY);

        let dispatcher = MessageDispatcher::new(
            graph.clone(),
            conversations.clone(),
            service.clone(),
            flows.clone(),
            config.max_tokens,
        );
        let branches = BranchManager::new(
            graph.clone(),
            conversations.clone(),
            session.clone(),
            dispatcher.clone(),
            flows.clone(),
        );
        let tooltips = TooltipCache::new(service.clone(), flows.clone(), config.tooltip_max_tokens);

        tracing::info!(service = service.name(), root = %NodeId::root(), "kernel initialized");

        Self {
            config,
            graph,
            conversations,
            session,
            dispatcher,
            branches,
            tooltips,
            flows,
        }
    }

    /// Create a kernel talking to `config.endpoint` over HTTP.
    pub fn with_http(config: KernelConfig) -> Self {
        let mut service = HttpCompletionService::new(config.endpoint.clone());
        if let Some(key) = config.resolve_api_key() {
            service = service.with_api_key(key);
        }
        Self::new(config, Arc::new(service))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ========================================================================
    // Conversation
    // ========================================================================

    /// Send a user turn on `node` and wait for the reply.
    pub async fn send_message(&self, node: NodeId, text: &str) -> Result<SendOutcome, GraphError> {
        self.dispatcher.send_message(node, text).await
    }

    /// Send on whichever node is active.
    pub async fn send_to_active(&self, text: &str) -> Result<SendOutcome, GraphError> {
        let active = self.session.active();
        self.send_message(active, text).await
    }

    /// Send on the side panel branch. `Ok(None)` when no panel is open.
    pub async fn send_to_side_panel(&self, text: &str) -> Result<Option<SendOutcome>, GraphError> {
        match self.session.side_panel() {
            Some(panel) => self.send_message(panel.node, text).await.map(Some),
            None => Ok(None),
        }
    }

    /// Copy of a node's history.
    pub fn conversation(&self, node: NodeId) -> Option<Vec<Message>> {
        self.conversations.history(node)
    }

    /// Whether `node` is waiting on the completion service.
    pub fn is_loading(&self, node: NodeId) -> bool {
        self.dispatcher.is_loading(node)
    }

    // ========================================================================
    // Branches
    // ========================================================================

    /// Branch off `parent` from highlighted text. The first exchange runs in
    /// the background; see [`Branch::first_exchange`].
    pub fn create_branch(&self, parent: NodeId, selected_text: &str) -> Result<Branch, BranchError> {
        self.branches.create_branch(parent, selected_text)
    }

    /// Branch off the active node.
    pub fn create_branch_from_active(&self, selected_text: &str) -> Result<Branch, BranchError> {
        self.create_branch(self.session.active(), selected_text)
    }

    // ========================================================================
    // Tooltips
    // ========================================================================

    /// One-sentence explanation of `term`, cached after the first success.
    pub async fn explain(&self, term: &str) -> String {
        self.tooltips.explain(term).await
    }

    /// Cached explanation, without calling the service.
    pub fn cached_explanation(&self, term: &str) -> Option<String> {
        self.tooltips.cached(term)
    }

    pub fn tooltip_loading(&self, term: &str) -> bool {
        self.tooltips.is_loading(term)
    }

    // ========================================================================
    // Session
    // ========================================================================

    pub fn session(&self) -> SessionState {
        self.session.state()
    }

    /// Make `node` the active conversation.
    pub fn focus_node(&self, node: NodeId) -> Result<(), GraphError> {
        self.session.focus_node(node)?;
        self.flows.publish(KernelFlow::Focused { node });
        Ok(())
    }

    /// Dismiss the side panel, returning what it showed.
    pub fn close_side_panel(&self) -> Option<SidePanel> {
        let closed = self.session.close_side_panel()?;
        self.flows.publish(KernelFlow::PanelClosed { node: closed.node });
        Some(closed)
    }

    /// Make the side panel branch active and dismiss the panel.
    pub fn promote_side_panel(&self) -> Option<NodeId> {
        let node = self.session.promote_side_panel()?;
        self.flows.publish(KernelFlow::Promoted { node });
        Some(node)
    }

    // ========================================================================
    // Graph queries
    // ========================================================================

    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.graph.read().node(id).cloned()
    }

    /// Resolve a user query to a node: exact label, then unique label
    /// prefix, then unique hex prefix.
    pub fn resolve_node(&self, query: &str) -> Result<NodeId, PrefixError> {
        let graph = self.graph.read();
        resolve_node_prefix(graph.nodes().map(|n| (n.id, n.label.as_str())), query)
    }

    /// Consistent copy of graph and session for rendering.
    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.graph.read();
        GraphSnapshot {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().to_vec(),
            session: self.session.state(),
            loading: self.dispatcher.pending_nodes(),
        }
    }

    /// Subscribe to kernel change events matching `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.flows.subscribe(pattern)
    }
}
