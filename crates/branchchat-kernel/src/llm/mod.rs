//! Completion service abstraction.
//!
//! The language-model backend is an opaque request/response collaborator: the
//! kernel sends a full conversation and gets back one reply string. Every
//! failure (network, status, malformed body) surfaces as an [`LlmError`],
//! which callers recover from locally with a fixed fallback reply.

mod http;
#[cfg(any(test, feature = "test-mock"))]
pub mod mock;

pub use http::HttpCompletionService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use branchchat_types::Message;

/// Default `max_tokens` for conversation turns.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Default `max_tokens` for tooltip explanations.
pub const DEFAULT_TOOLTIP_MAX_TOKENS: u32 = 150;

/// A completion request: the whole transcript plus a token budget.
///
/// Serializes to exactly `{"messages": [...], "max_tokens": n}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Conversation history, oldest first, ending with a user turn.
    pub messages: Vec<Message>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a new completion request with the default token budget.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// A single-user-turn request.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    /// Set max tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Error type for completion calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Service not configured or unavailable.
    #[error("service not available: {0}")]
    Unavailable(String),

    /// Non-success HTTP status.
    #[error("api error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// Body was not the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// Result type for completion calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Trait for completion backends.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Service name for logs (e.g., "http").
    fn name(&self) -> &str;

    /// Send the request and return the full reply text.
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String>;
}
