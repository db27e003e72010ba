//! Message dispatch: one request/response cycle on one node.
//!
//! # Flow
//!
//! ```text
//! send_message(node, text)
//!       │  reject: blank text, or node already in flight
//!       ▼
//! append User turn ──▶ mark node pending ──▶ complete(full history)
//!                                                 │ Ok(reply) / Err(_) → fallback
//!                                                 ▼
//!                         append Assistant turn ──▶ relabel on first exchange
//!                                                 │
//!                                                 ▼
//!                                        clear pending mark
//! ```
//!
//! Loading is tracked per node. Two nodes can be in flight at once; a second
//! send to a node that is already waiting is rejected, which keeps every
//! conversation strictly alternating. A send dropped mid-request still closes
//! its turn, with the fallback reply.

use std::sync::Arc;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use branchchat_types::{Message, NodeId, truncate_label};

use crate::conversation::SharedConversationStore;
use crate::flows::{KernelFlow, SharedKernelFlowBus};
use crate::graph::{GraphError, SharedGraphStore};
use crate::llm::{CompletionRequest, CompletionService};

/// Assistant turn recorded when the completion service fails.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error processing your request.";

/// Why a send was turned away without touching the conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Text was empty or whitespace-only.
    Empty,
    /// The node already has a request outstanding.
    InFlight,
}

/// Result of a `send_message` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendOutcome {
    /// The service replied; its text was appended.
    Delivered,
    /// The service failed; [`FALLBACK_REPLY`] was appended.
    Fallback,
    /// Nothing was appended.
    Rejected(RejectReason),
}

impl SendOutcome {
    /// Whether a user/assistant pair was appended.
    pub fn completed(&self) -> bool {
        matches!(self, Self::Delivered | Self::Fallback)
    }
}

/// A user turn still waiting for its assistant turn.
struct OpenTurn {
    /// Index the assistant turn will land at.
    reply_index: usize,
    /// Label to apply once answered, set on a node's first exchange.
    first_label: Option<String>,
}

/// Marks a node pending for as long as it lives.
///
/// If it is dropped with a turn still open (the dispatch future was dropped
/// or its task aborted mid-request), the turn is closed with
/// [`FALLBACK_REPLY`] so the conversation keeps alternating.
struct PendingGuard<'a> {
    dispatcher: &'a MessageDispatcher,
    node: NodeId,
    open_turn: Option<OpenTurn>,
}

impl<'a> PendingGuard<'a> {
    fn acquire(dispatcher: &'a MessageDispatcher, node: NodeId) -> Option<Self> {
        dispatcher.pending.insert(node).then_some(Self {
            dispatcher,
            node,
            open_turn: None,
        })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(turn) = self.open_turn.take() {
            tracing::warn!(node = %self.node, "dispatch dropped before the reply arrived, recording fallback reply");
            if let Err(e) = self.dispatcher.close_turn(self.node, turn, FALLBACK_REPLY.to_string()) {
                tracing::error!(node = %self.node, error = %e, "failed to close abandoned turn");
            }
        }
        self.dispatcher.pending.remove(&self.node);
    }
}

/// Drives the request/response cycle for node conversations.
///
/// Cheap to clone; clones share stores, service and pending set.
#[derive(Clone)]
pub struct MessageDispatcher {
    graph: SharedGraphStore,
    conversations: SharedConversationStore,
    service: Arc<dyn CompletionService>,
    pending: Arc<DashSet<NodeId>>,
    flows: SharedKernelFlowBus,
    max_tokens: u32,
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("service", &self.service.name())
            .field("pending", &self.pending.len())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl MessageDispatcher {
    pub fn new(
        graph: SharedGraphStore,
        conversations: SharedConversationStore,
        service: Arc<dyn CompletionService>,
        flows: SharedKernelFlowBus,
        max_tokens: u32,
    ) -> Self {
        Self {
            graph,
            conversations,
            service,
            pending: Arc::new(DashSet::new()),
            flows,
            max_tokens,
        }
    }

    /// Whether `node` has a request outstanding.
    pub fn is_loading(&self, node: NodeId) -> bool {
        self.pending.contains(&node)
    }

    /// All nodes with a request outstanding.
    pub fn pending_nodes(&self) -> Vec<NodeId> {
        self.pending.iter().map(|n| *n).collect()
    }

    /// Send `text` as a user turn on `node` and append the reply.
    ///
    /// Service failures never surface here: they become a [`FALLBACK_REPLY`]
    /// turn and a `Fallback` outcome. Only a node without a conversation is
    /// an error.
    #[tracing::instrument(skip(self, text), fields(node = %node), name = "dispatch.send")]
    pub async fn send_message(&self, node: NodeId, text: &str) -> Result<SendOutcome, GraphError> {
        if text.trim().is_empty() {
            tracing::debug!("ignoring blank message");
            return Ok(SendOutcome::Rejected(RejectReason::Empty));
        }
        if !self.conversations.contains(node) {
            return Err(GraphError::UnknownNode(node));
        }
        let Some(mut guard) = PendingGuard::acquire(self, node) else {
            tracing::debug!("node already in flight, rejecting send");
            return Ok(SendOutcome::Rejected(RejectReason::InFlight));
        };

        let before = self.conversations.append_user(node, text)?;
        guard.open_turn = Some(OpenTurn {
            reply_index: before + 1,
            first_label: (before == 0).then(|| truncate_label(text)),
        });
        self.flows.publish(KernelFlow::MessageAppended {
            node,
            index: before,
            message: Message::user(text),
        });
        self.flows.publish(KernelFlow::DispatchStarted { node });

        let history = self
            .conversations
            .history(node)
            .ok_or(GraphError::UnknownNode(node))?;
        let request = CompletionRequest::new(history).with_max_tokens(self.max_tokens);

        let (reply, outcome) = match self.service.complete(request).await {
            Ok(reply) => (reply, SendOutcome::Delivered),
            Err(e) => {
                tracing::warn!(service = self.service.name(), error = %e, "completion failed, recording fallback reply");
                (FALLBACK_REPLY.to_string(), SendOutcome::Fallback)
            }
        };

        if let Some(turn) = guard.open_turn.take() {
            self.close_turn(node, turn, reply)?;
        }

        drop(guard);
        self.flows.publish(KernelFlow::DispatchFinished { node, outcome });
        Ok(outcome)
    }

    /// Append the assistant turn and, on a first exchange, relabel the node.
    fn close_turn(&self, node: NodeId, turn: OpenTurn, reply: String) -> Result<(), GraphError> {
        self.conversations.append_assistant(node, reply.as_str())?;
        self.flows.publish(KernelFlow::MessageAppended {
            node,
            index: turn.reply_index,
            message: Message::assistant(reply),
        });

        if let Some(label) = turn.first_label {
            self.graph.write().relabel(node, label.clone())?;
            self.flows.publish(KernelFlow::NodeRelabeled { node, label });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::shared_conversation_store;
    use crate::flows::shared_kernel_flow_bus;
    use crate::graph::{GraphStore, ROOT_POSITION};
    use crate::llm::mock::ScriptedCompletion;
    use branchchat_types::{Node, Role};
    use parking_lot::RwLock;

    fn setup(service: ScriptedCompletion) -> (MessageDispatcher, SharedGraphStore, SharedConversationStore, Arc<ScriptedCompletion>) {
        let graph = Arc::new(RwLock::new(GraphStore::with_root(Node::root(
            "Start your learning journey",
            ROOT_POSITION,
        ))));
        let conversations = shared_conversation_store();
        conversations.create(NodeId::root()).unwrap();
        let service = Arc::new(service);
        let dispatcher = MessageDispatcher::new(
            graph.clone(),
            conversations.clone(),
            service.clone(),
            shared_kernel_flow_bus(64),
            2000,
        );
        (dispatcher, graph, conversations, service)
    }

    #[tokio::test]
    async fn test_first_exchange_appends_and_relabels() {
        let (dispatcher, graph, conversations, _) =
            setup(ScriptedCompletion::new().reply("Entropy measures disorder."));

        let outcome = dispatcher.send_message(NodeId::root(), "Explain entropy").await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(
            conversations.history(NodeId::root()).unwrap(),
            vec![
                Message::user("Explain entropy"),
                Message::assistant("Entropy measures disorder."),
            ]
        );
        assert_eq!(graph.read().node(NodeId::root()).unwrap().label, "Explain entropy");
        assert!(!dispatcher.is_loading(NodeId::root()));
    }

    #[tokio::test]
    async fn test_full_history_is_sent() {
        let (dispatcher, _, _, service) =
            setup(ScriptedCompletion::new().reply("one").reply("two"));

        dispatcher.send_message(NodeId::root(), "first").await.unwrap();
        dispatcher.send_message(NodeId::root(), "second").await.unwrap();

        let requests = service.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages, vec![Message::user("first")]);
        assert_eq!(
            requests[1].messages,
            vec![Message::user("first"), Message::assistant("one"), Message::user("second")]
        );
        assert_eq!(requests[1].max_tokens, 2000);
    }

    #[tokio::test]
    async fn test_label_set_once() {
        let (dispatcher, graph, _, _) = setup(ScriptedCompletion::new().reply("a").reply("b"));
        let question = "What is quantum entanglement and why does it matter";

        dispatcher.send_message(NodeId::root(), question).await.unwrap();
        dispatcher.send_message(NodeId::root(), "Tell me more about Bell tests").await.unwrap();

        assert_eq!(
            graph.read().node(NodeId::root()).unwrap().label,
            "What is quantum entanglement and why doe"
        );
    }

    #[tokio::test]
    async fn test_failure_appends_fallback() {
        let (dispatcher, _, conversations, _) =
            setup(ScriptedCompletion::new().fail("connection refused"));

        let outcome = dispatcher.send_message(NodeId::root(), "hello").await.unwrap();
        assert_eq!(outcome, SendOutcome::Fallback);
        let history = conversations.history(NodeId::root()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let (dispatcher, _, conversations, service) = setup(ScriptedCompletion::new());
        for text in ["", "   ", "\n\t"] {
            let outcome = dispatcher.send_message(NodeId::root(), text).await.unwrap();
            assert_eq!(outcome, SendOutcome::Rejected(RejectReason::Empty));
        }
        assert_eq!(conversations.len(NodeId::root()), Some(0));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let (dispatcher, _, _, _) = setup(ScriptedCompletion::new());
        let ghost = NodeId::new();
        assert_eq!(
            dispatcher.send_message(ghost, "hi").await,
            Err(GraphError::UnknownNode(ghost))
        );
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_rejected() {
        let (service, gate) = ScriptedCompletion::new().reply("done").gated();
        let (dispatcher, _, conversations, service) = setup(service);

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send_message(NodeId::root(), "first").await }
        });
        while service.calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(dispatcher.is_loading(NodeId::root()));
        assert_eq!(conversations.len(NodeId::root()), Some(1));
        let second = dispatcher.send_message(NodeId::root(), "second").await.unwrap();
        assert_eq!(second, SendOutcome::Rejected(RejectReason::InFlight));

        gate.release(1);
        assert_eq!(first.await.unwrap().unwrap(), SendOutcome::Delivered);
        assert_eq!(conversations.len(NodeId::root()), Some(2));
        assert!(dispatcher.pending_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_dispatch_closes_turn() {
        let (service, gate) = ScriptedCompletion::new().reply("Second try.").gated();
        let (dispatcher, graph, conversations, service) = setup(service);

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send_message(NodeId::root(), "stuck").await }
        });
        while service.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(dispatcher.is_loading(NodeId::root()));
        assert_eq!(conversations.len(NodeId::root()), Some(1));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!dispatcher.is_loading(NodeId::root()));
        assert_eq!(
            conversations.history(NodeId::root()).unwrap(),
            vec![Message::user("stuck"), Message::assistant(FALLBACK_REPLY)]
        );
        assert_eq!(graph.read().node(NodeId::root()).unwrap().label, "stuck");

        gate.release(1);
        let outcome = dispatcher.send_message(NodeId::root(), "again").await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered);
        let history = conversations.history(NodeId::root()).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2..], [Message::user("again"), Message::assistant("Second try.")]);
    }
}
