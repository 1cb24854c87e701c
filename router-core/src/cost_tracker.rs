//! Cost Tracker collaborator contract (§4.4) plus a ready-to-use in-memory
//! implementation.
//!
//! The trait is grounded on the ancestor SDK's `Cache` trait in `cache.rs`
//! (a small, synchronous-looking trait object behind `Arc<dyn _>`); the
//! concrete implementation is grounded on the gateway's
//! `plugins::cost_tracking::CostTrackingPlugin`, reworked from a per-entry
//! cost ledger into the admission-and-totals shape this spec specifies.

use std::sync::Mutex;

use crate::models::UsageTotals;

/// Heuristic token estimate for a candidate request. Never fails — the
/// contract (§4.4) explicitly calls this out as a heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimate {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Failure recording actual usage after a call. §7 "Success is atomic": a
/// response is returned only after both the adapter call and this record
/// succeed, so the router must have something to convert into a provider
/// failure when persistence (e.g. the host's storage) falls over.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to record usage: {0}")]
pub struct CostTrackerError(pub String);

impl CostTrackerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The router's view of a cost tracker. Implementations are external
/// (§4.4); the router only calls these documented methods and never
/// inspects or mutates the tracker's internals (§3 "Ownership").
pub trait CostTracker: Send + Sync {
    fn estimate_token_usage(&self, model: &str, text: &str) -> TokenEstimate;
    fn can_spend(&self, tokens: u64) -> bool;
    fn record(
        &self,
        model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        metadata: &str,
    ) -> Result<u64, CostTrackerError>;
    fn usage_totals(&self) -> UsageTotals;
    fn cumulative_totals(&self) -> UsageTotals;
    fn estimate_tokens_from_text(&self, text: &str) -> u64;
}

/// Whitespace-token heuristic, a lifetime ceiling, and within-cycle plus
/// cumulative totals behind a single lock. Ships so the router is usable
/// without a host-supplied tracker, the same way the ancestor SDK ships
/// `InMemoryCache` alongside the `Cache` trait it specifies.
pub struct InMemoryCostTracker {
    ceiling: Option<u64>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    usage: UsageTotals,
    cumulative: UsageTotals,
}

impl InMemoryCostTracker {
    /// `ceiling` is the lifetime token budget; `None` means unlimited.
    pub fn new(ceiling: Option<u64>) -> Self {
        Self {
            ceiling,
            state: Mutex::new(State::default()),
        }
    }

    fn estimate_from_text(text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

impl Default for InMemoryCostTracker {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CostTracker for InMemoryCostTracker {
    fn estimate_token_usage(&self, _model: &str, text: &str) -> TokenEstimate {
        let prompt_tokens = Self::estimate_from_text(text);
        // A rough completion estimate; real adapters overwrite this once
        // they actually respond (§4.8).
        let completion_tokens = prompt_tokens / 4 + 1;
        TokenEstimate {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    fn can_spend(&self, tokens: u64) -> bool {
        match self.ceiling {
            None => true,
            Some(ceiling) => {
                let state = self.state.lock().expect("cost tracker lock poisoned");
                state.cumulative.total_tokens + tokens <= ceiling
            }
        }
    }

    fn record(
        &self,
        _model: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
        _metadata: &str,
    ) -> Result<u64, CostTrackerError> {
        let total = prompt_tokens + completion_tokens;
        let mut state = self.state.lock().expect("cost tracker lock poisoned");
        state.usage.prompt_tokens += prompt_tokens;
        state.usage.completion_tokens += completion_tokens;
        state.usage.total_tokens += total;
        state.cumulative.prompt_tokens += prompt_tokens;
        state.cumulative.completion_tokens += completion_tokens;
        state.cumulative.total_tokens += total;
        Ok(total)
    }

    fn usage_totals(&self) -> UsageTotals {
        self.state.lock().expect("cost tracker lock poisoned").usage
    }

    fn cumulative_totals(&self) -> UsageTotals {
        self.state.lock().expect("cost tracker lock poisoned").cumulative
    }

    fn estimate_tokens_from_text(&self, text: &str) -> u64 {
        Self::estimate_from_text(text)
    }
}

/// A tracker whose `record` always fails, standing in for a host whose
/// persistence hook (§5 "suspension points") is down. Exposed (not nested
/// under `mod tests`) so `router.rs`'s own tests can reuse it to exercise
/// the router's §7 "Success is atomic" handling.
#[cfg(test)]
pub struct FailingRecordTracker;

#[cfg(test)]
impl CostTracker for FailingRecordTracker {
    fn estimate_token_usage(&self, _model: &str, text: &str) -> TokenEstimate {
        let prompt_tokens = InMemoryCostTracker::estimate_from_text(text);
        TokenEstimate {
            prompt_tokens,
            completion_tokens: 1,
            total_tokens: prompt_tokens + 1,
        }
    }

    fn can_spend(&self, _tokens: u64) -> bool {
        true
    }

    fn record(
        &self,
        _model: &str,
        _prompt_tokens: u64,
        _completion_tokens: u64,
        _metadata: &str,
    ) -> Result<u64, CostTrackerError> {
        Err(CostTrackerError::new("persistence backend unavailable"))
    }

    fn usage_totals(&self) -> UsageTotals {
        UsageTotals::default()
    }

    fn cumulative_totals(&self) -> UsageTotals {
        UsageTotals::default()
    }

    fn estimate_tokens_from_text(&self, text: &str) -> u64 {
        InMemoryCostTracker::estimate_from_text(text)
    }
}
