//! Pub/sub of kernel change events.
//!
//! Rendering layers never poll the kernel; they subscribe to the FlowBus and
//! re-project the graph, conversation or session when a matching event lands.
//! Subscribers use NATS-style subject patterns to filter events of interest.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `session.*` matches `session.focused`
//! - `>` matches one or more tokens (only at end): `node.>` matches `node.created`
//! - Exact match: `dispatch.finished` only matches `dispatch.finished`
//!
//! # Example
//!
//! ```ignore
//! let mut sub = kernel.subscribe("dispatch.*");
//! while let Some(msg) = sub.recv().await {
//!     println!("{}: {:?}", msg.subject, msg.payload.node());
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use branchchat_types::{Message, NodeId, NodeKind};

use crate::dispatch::SendOutcome;

/// Default channel capacity for the kernel bus.
pub const DEFAULT_FLOW_CAPACITY: usize = 256;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Whether `subject` matches the NATS-style `pattern`.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut subject = subject.split('.');
    let mut pattern = pattern.split('.').peekable();

    while let Some(token) = pattern.next() {
        match (token, subject.next()) {
            // `>` is a tail wildcard: valid only last, needs at least one token.
            (">", Some(_)) => return pattern.peek().is_none(),
            (_, None) => return false,
            ("*", Some(_)) => {}
            (token, Some(s)) if token == s => {}
            _ => return false,
        }
    }
    subject.next().is_none()
}

// ============================================================================
// Kernel Flow Events
// ============================================================================

/// Everything the visual surface needs to stay in sync with the kernel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KernelFlow {
    /// A node and its incoming edge were added.
    NodeCreated {
        node: NodeId,
        parent: Option<NodeId>,
        kind: NodeKind,
        label: String,
    },
    /// A node's label changed after its first exchange.
    NodeRelabeled { node: NodeId, label: String },
    /// A turn was appended to a conversation.
    MessageAppended {
        node: NodeId,
        index: usize,
        message: Message,
    },
    /// A node entered its loading state.
    DispatchStarted { node: NodeId },
    /// A node left its loading state.
    DispatchFinished { node: NodeId, outcome: SendOutcome },
    /// A tooltip lookup missed the cache and went to the service.
    TooltipStarted { term: String },
    /// A tooltip lookup completed.
    TooltipResolved {
        term: String,
        explanation: String,
        cached: bool,
    },
    /// The active node changed.
    Focused { node: NodeId },
    /// A branch was opened in the side panel.
    PanelOpened { node: NodeId, parent: NodeId },
    /// The side panel was dismissed.
    PanelClosed { node: NodeId },
    /// The side panel branch became the active node.
    Promoted { node: NodeId },
}

impl KernelFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::NodeCreated { .. } => "node.created",
            Self::NodeRelabeled { .. } => "node.relabeled",
            Self::MessageAppended { .. } => "conversation.appended",
            Self::DispatchStarted { .. } => "dispatch.started",
            Self::DispatchFinished { .. } => "dispatch.finished",
            Self::TooltipStarted { .. } => "tooltip.started",
            Self::TooltipResolved { .. } => "tooltip.resolved",
            Self::Focused { .. } => "session.focused",
            Self::PanelOpened { .. } => "session.panel_opened",
            Self::PanelClosed { .. } => "session.panel_closed",
            Self::Promoted { .. } => "session.promoted",
        }
    }

    /// The node this event concerns, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::NodeCreated { node, .. }
            | Self::NodeRelabeled { node, .. }
            | Self::MessageAppended { node, .. }
            | Self::DispatchStarted { node }
            | Self::DispatchFinished { node, .. }
            | Self::Focused { node }
            | Self::PanelOpened { node, .. }
            | Self::PanelClosed { node }
            | Self::Promoted { node } => Some(*node),
            Self::TooltipStarted { .. } | Self::TooltipResolved { .. } => None,
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Clone, Debug)]
pub struct FlowMessage {
    pub subject: &'static str,
    pub payload: KernelFlow,
    /// When the event was published.
    pub timestamp: Instant,
}

// ============================================================================
// FlowBus
// ============================================================================

/// Broadcast bus for [`KernelFlow`] events.
///
/// Every subscriber sees every event published after it subscribed, filtered
/// by its own pattern. Publishing never blocks; a subscriber that falls more
/// than the channel capacity behind skips the oldest events.
#[derive(Debug)]
pub struct FlowBus {
    tx: broadcast::Sender<FlowMessage>,
}

impl FlowBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns how many subscribers it reached.
    pub fn publish(&self, payload: KernelFlow) -> usize {
        let msg = FlowMessage {
            subject: payload.subject(),
            payload,
            timestamp: Instant::now(),
        };
        self.tx.send(msg).unwrap_or(0)
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Shared kernel flow bus.
pub type SharedKernelFlowBus = Arc<FlowBus>;

pub fn shared_kernel_flow_bus(capacity: usize) -> SharedKernelFlowBus {
    Arc::new(FlowBus::new(capacity))
}

// ============================================================================
// Subscription
// ============================================================================

/// Pattern-filtered view of a [`FlowBus`].
pub struct Subscription {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage>,
}

impl Subscription {
    /// Next matching event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => self.lagged(n),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, for callers polling once per frame.
    pub fn try_recv(&mut self) -> Option<FlowMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.lagged(n),
                Err(_) => return None,
            }
        }
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(pattern = %self.pattern, skipped, "flow subscriber fell behind, events dropped");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("node.created", "node.created"));
        assert!(matches_pattern("node.*", "node.relabeled"));
        assert!(matches_pattern("*.focused", "session.focused"));
        assert!(matches_pattern(">", "dispatch.started"));
        assert!(matches_pattern("session.>", "session.panel_opened"));
        assert!(!matches_pattern("node.*", "session.focused"));
        assert!(!matches_pattern("node", "node.created"));
        assert!(!matches_pattern("node.created.extra", "node.created"));
        assert!(!matches_pattern("node.>", "node"));
        assert!(!matches_pattern(">.created", "node.created"));
    }

    #[test]
    fn test_subjects() {
        let node = NodeId::new();
        assert_eq!(KernelFlow::DispatchStarted { node }.subject(), "dispatch.started");
        assert_eq!(KernelFlow::Promoted { node }.subject(), "session.promoted");
        assert_eq!(
            KernelFlow::TooltipStarted { term: "x".into() }.node(),
            None
        );
        assert_eq!(KernelFlow::PanelClosed { node }.node(), Some(node));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = FlowBus::new(8);
        assert_eq!(bus.publish(KernelFlow::Focused { node: NodeId::root() }), 0);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_pattern() {
        let bus = FlowBus::new(16);
        let mut sub = bus.subscribe("session.*");
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(KernelFlow::DispatchStarted { node: NodeId::root() });
        bus.publish(KernelFlow::Focused { node: NodeId::root() });

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.subject, "session.focused");
        assert_eq!(msg.payload, KernelFlow::Focused { node: NodeId::root() });
        assert!(sub.try_recv().is_none());
    }
}
