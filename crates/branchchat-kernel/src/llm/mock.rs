//! Scripted completion service for tests.
//!
//! Replies are queued up front and handed out in order; every request is
//! recorded. A gated service parks each call until the test releases it,
//! which lets tests observe state while a request is in flight.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::{CompletionRequest, CompletionService, LlmError, LlmResult};

#[derive(Debug)]
enum Scripted {
    Reply(String),
    Fail(String),
}

/// Handle that lets parked requests proceed.
#[derive(Debug, Clone)]
pub struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let `n` parked (or future) requests through.
    pub fn release(&self, n: usize) {
        self.0.add_permits(n);
    }
}

/// Completion service returning queued replies.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    /// Queue a failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push_failure(message);
        self
    }

    /// Park every call until released through the returned gate.
    pub fn gated(mut self) -> (Self, Gate) {
        let semaphore = Arc::new(Semaphore::new(0));
        self.gate = Some(semaphore.clone());
        (self, Gate(semaphore))
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.script.lock().push_back(Scripted::Reply(text.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().push_back(Scripted::Fail(message.into()));
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        self.requests.lock().push(request);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| LlmError::Unavailable(e.to_string()))?
                .forget();
        }

        match self.script.lock().pop_front() {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(LlmError::NetworkError(message)),
            None => Err(LlmError::Unavailable("no scripted reply left".into())),
        }
    }
}
