//! Error types for the routing engine.
//!
//! Two enums cover the two layers this crate owns: [`AdapterError`] is what a
//! provider adapter reports back to the executor, and [`RouterError`] is what
//! `Router::generate` ultimately surfaces to the host. The boundary between
//! them is deliberate: adapters never see router-level concerns like the
//! candidate list or the circuit breaker, and the router never inspects an
//! adapter's internals beyond this error shape.

use crate::models::FailureRecord;

/// Coarse classification of an adapter failure, used to decide whether the
/// retry executor may retry it at all.
///
/// Built from the adapter's `status` field first; string-sniffing the message
/// for "unauthorized"/"unauthorised"/"forbidden" is a fallback only, for
/// adapters that can't supply a structured status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// HTTP 401/403 (or message-sniffed equivalent). Never retried.
    Auth,
    /// Anything else. Retryable up to the configured limit.
    Transient,
}

/// An error reported by a provider adapter's `summarise` call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("adapter error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
pub struct AdapterError {
    pub status: Option<u16>,
    pub message: String,
}

impl AdapterError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn auth(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    /// Classify this error per §4.5: a status of 401/403 is authoritative;
    /// otherwise fall back to sniffing the message for the documented words.
    pub fn kind(&self) -> AdapterErrorKind {
        if matches!(self.status, Some(401) | Some(403)) {
            return AdapterErrorKind::Auth;
        }
        let lower = self.message.to_lowercase();
        if lower.contains("unauthorized") || lower.contains("unauthorised") || lower.contains("forbidden")
        {
            return AdapterErrorKind::Auth;
        }
        AdapterErrorKind::Transient
    }
}

/// Error surfaced by the router, either per-candidate or for the whole request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    #[error("request text must not be empty")]
    EmptyText,

    #[error("missing API key for provider {provider}")]
    MissingKey { provider: String },

    #[error("authentication failed for provider {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("token budget exceeded for provider {provider}")]
    BudgetExceeded { provider: String },

    #[error("circuit open for provider {provider}")]
    CircuitOpen { provider: String },

    #[error("adapter call to {provider} timed out")]
    Timeout { provider: String },

    #[error("adapter call to {provider} failed: {message}")]
    AdapterTransient { provider: String, message: String },

    /// §7 "Success is atomic": the adapter call succeeded but recording its
    /// usage did not, so the candidate is treated as failed.
    #[error("failed to record usage for {provider}: {message}")]
    RecordingFailed { provider: String, message: String },

    #[error("No free providers available and paid disabled.")]
    PaidDisabled,

    #[error("no candidate provider succeeded: {}", render_attempts(attempts))]
    NoCandidates { attempts: Vec<FailureRecord> },
}

impl RouterError {
    /// `ETIMEOUT` is used verbatim by the spec's glossary for the timeout code.
    pub const ETIMEOUT: &'static str = "ETIMEOUT";
}

fn render_attempts(attempts: &[FailureRecord]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.provider, a.reason_or_message()))
        .collect::<Vec<_>>()
        .join(", ")
}
