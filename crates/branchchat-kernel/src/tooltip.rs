//! Quick explanations for highlighted terms.
//!
//! Keyed by the exact term text (case- and whitespace-sensitive). Successful
//! explanations are kept for the life of the process; failures are never
//! cached, so the next lookup for the same term goes back to the service.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::flows::{KernelFlow, SharedKernelFlowBus};
use crate::llm::{CompletionRequest, CompletionService};

/// Returned when the service fails. Not cached.
pub const TOOLTIP_FALLBACK: &str = "Unable to fetch explanation.";

/// The single prompt sent for a tooltip.
pub fn tooltip_prompt(term: &str) -> String {
    format!("Provide a brief, one-sentence explanation of: {term}")
}

/// Counts in-progress lookups for a term while alive.
struct TermLoading<'a> {
    loading: &'a DashMap<String, usize>,
    term: String,
}

impl<'a> TermLoading<'a> {
    fn enter(loading: &'a DashMap<String, usize>, term: &str) -> Self {
        *loading.entry(term.to_string()).or_insert(0) += 1;
        Self {
            loading,
            term: term.to_string(),
        }
    }
}

impl Drop for TermLoading<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut slot) = self.loading.entry(self.term.clone()) {
            *slot.get_mut() -= 1;
            if *slot.get() == 0 {
                slot.remove();
            }
        }
    }
}

/// Memoized term → explanation lookups.
pub struct TooltipCache {
    entries: DashMap<String, String>,
    loading: DashMap<String, usize>,
    service: Arc<dyn CompletionService>,
    flows: SharedKernelFlowBus,
    max_tokens: u32,
}

impl std::fmt::Debug for TooltipCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TooltipCache")
            .field("entries", &self.entries.len())
            .field("loading", &self.loading.len())
            .field("service", &self.service.name())
            .finish()
    }
}

impl TooltipCache {
    pub fn new(service: Arc<dyn CompletionService>, flows: SharedKernelFlowBus, max_tokens: u32) -> Self {
        Self {
            entries: DashMap::new(),
            loading: DashMap::new(),
            service,
            flows,
            max_tokens,
        }
    }

    /// Explain `term`, from cache when possible.
    #[tracing::instrument(skip(self), name = "tooltip.explain")]
    pub async fn explain(&self, term: &str) -> String {
        if let Some(hit) = self.cached(term) {
            tracing::debug!("tooltip cache hit");
            self.flows.publish(KernelFlow::TooltipResolved {
                term: term.to_string(),
                explanation: hit.clone(),
                cached: true,
            });
            return hit;
        }

        let loading = TermLoading::enter(&self.loading, term);
        self.flows.publish(KernelFlow::TooltipStarted {
            term: term.to_string(),
        });

        let request = CompletionRequest::prompt(tooltip_prompt(term)).with_max_tokens(self.max_tokens);
        let explanation = match self.service.complete(request).await {
            // A concurrent miss on the same term may have landed first; keep
            // whichever explanation was cached first.
            Ok(explanation) => self
                .entries
                .entry(term.to_string())
                .or_insert(explanation)
                .value()
                .clone(),
            Err(e) => {
                tracing::warn!(error = %e, "tooltip lookup failed");
                TOOLTIP_FALLBACK.to_string()
            }
        };

        drop(loading);
        self.flows.publish(KernelFlow::TooltipResolved {
            term: term.to_string(),
            explanation: explanation.clone(),
            cached: false,
        });
        explanation
    }

    /// Cached explanation for `term`, without calling the service.
    pub fn cached(&self, term: &str) -> Option<String> {
        self.entries.get(term).map(|e| e.value().clone())
    }

    /// Whether a lookup for `term` is waiting on the service.
    pub fn is_loading(&self, term: &str) -> bool {
        self.loading.contains_key(term)
    }

    /// Whether any lookup is waiting on the service.
    pub fn any_loading(&self) -> bool {
        !self.loading.is_empty()
    }

    /// Number of cached terms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
