//! # branchchat-kernel
//!
//! Core of a branching learning chat.
//!
//! A session starts from one root conversation. Highlighting text in a reply
//! spins off a child conversation (a branch) that opens in a side panel, is
//! seeded with "What is <text>?", and can be promoted to the active
//! conversation. Highlighted terms can also be explained in one sentence,
//! with the answers cached for the life of the kernel.
//!
//! The [`Kernel`] wires the pieces together:
//! - [`GraphStore`]: nodes and parent→child edges, plus branch placement
//! - [`ConversationStore`]: one append-only history per node
//! - [`BranchManager`]: creates branches and kicks off their first exchange
//! - [`MessageDispatcher`]: one request/response cycle with per-node loading
//! - [`TooltipCache`]: memoized term explanations
//! - [`SessionController`]: active node and side panel
//!
//! Every change is announced on a [`FlowBus`] so rendering layers can
//! re-project without polling.

pub mod branch;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod flows;
pub mod graph;
pub mod kernel;
pub mod llm;
pub mod session;
pub mod tooltip;

pub use branch::{Branch, BranchError, BranchManager, first_question};
pub use config::{ConfigError, KernelConfig, load_config, load_config_file};
pub use conversation::{ConversationStore, SharedConversationStore, shared_conversation_store};
pub use dispatch::{FALLBACK_REPLY, MessageDispatcher, RejectReason, SendOutcome};
pub use flows::{
    FlowBus, FlowMessage, KernelFlow, SharedKernelFlowBus, Subscription,
    matches_pattern, shared_kernel_flow_bus,
};
pub use graph::{GraphError, GraphStore, SharedGraphStore, shared_graph_store};
pub use kernel::{GraphSnapshot, Kernel};
pub use llm::{CompletionRequest, CompletionService, HttpCompletionService, LlmError, LlmResult};
pub use session::{SessionAction, SessionController, SessionState, SidePanel};
pub use tooltip::{TOOLTIP_FALLBACK, TooltipCache};
