//! Data model shared by every other module in this crate: provider
//! identifiers, credentials, health records, the public request/response
//! shapes, and the adapter-facing request/response shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical, lower-case provider identifier, e.g. `"gemini_paid"`.
pub type ProviderId = String;

/// Governs ordering, skip rules, and preference placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTier {
    Local,
    Free,
    Trial,
    Paid,
}

/// Fixed, per-provider metadata from the registry's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub tier: ProviderTier,
    pub requires_key: bool,
    pub adapter_kind: String,
}

/// Resolved credential for one invocation attempt.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Local-tier provider; no authentication needed.
    None,
    ApiKey { secret: String, key_hash: i64 },
    OAuth {
        access_token: String,
        project: String,
        location: String,
        endpoint: Option<String>,
        expires_at_ms: i64,
    },
}

/// Mutable per-provider health record owned exclusively by the `Router`.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    pub consecutive_failures: u32,
    pub blocked_until_ms: i64,
    pub auth_invalid: bool,
    pub last_key_hash: Option<i64>,
    pub cumulative_calls: u64,
    pub cumulative_tokens_in: u64,
    pub cumulative_tokens_out: u64,
    pub cumulative_total_tokens: u64,
}

impl ProviderHealth {
    /// `blockedUntilMs > now`.
    pub fn is_blocked(&self, now_ms: i64) -> bool {
        self.blocked_until_ms > now_ms
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.blocked_until_ms = 0;
    }

    /// `threshold`/`open_duration_ms` come from the breaker's constants
    /// (§4.5: `THRESHOLD = 3`, `OPEN_DURATION = 60_000ms`).
    pub fn on_failure(&mut self, now_ms: i64, threshold: u32, open_duration_ms: i64) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= threshold {
            self.blocked_until_ms = now_ms + open_duration_ms;
        }
    }

    /// Clears `authInvalid` iff the newly observed key hash differs from the
    /// last one recorded (§8 invariant 8).
    pub fn observe_key_hash(&mut self, key_hash: Option<i64>) {
        if key_hash != self.last_key_hash {
            self.auth_invalid = false;
        }
        self.last_key_hash = key_hash;
    }
}

/// Routing defaults and per-call overrides (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub provider_order: Vec<ProviderId>,
    /// Default is `0`: the source's literal default is referenced but not
    /// defined (§9 open question); this implementation fixes it at zero
    /// attempts beyond the first, i.e. no retries unless configured.
    pub retry_limit: u32,
    /// `0` disables the timeout race entirely.
    pub timeout_ms: u32,
    pub disable_paid: bool,
    pub dry_run: bool,
    /// `0` disables the per-call token cap.
    pub max_tokens_per_call: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            provider_order: Vec::new(),
            retry_limit: 0,
            timeout_ms: 0,
            disable_paid: false,
            dry_run: false,
            max_tokens_per_call: 0,
        }
    }
}

/// The Gemini-specific configuration block (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub project_env: String,
    pub location_env: String,
    pub credentials_env: String,
    pub vertex_endpoint_env: String,
    pub default_model_free: String,
    pub default_model_paid: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            project_env: "GOOGLE_CLOUD_PROJECT".to_string(),
            location_env: "GOOGLE_CLOUD_LOCATION".to_string(),
            credentials_env: "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
            vertex_endpoint_env: "VERTEX_ENDPOINT".to_string(),
            default_model_free: "gemini-1.5-flash".to_string(),
            default_model_paid: "gemini-1.5-pro".to_string(),
        }
    }
}

/// Per-provider configuration block (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    pub model: String,
    pub api_url: Option<String>,
    pub api_key_env_var: Option<String>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub transcription_url: Option<String>,
    pub tts_url: Option<String>,
}

/// Inbound request to `Router::generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub text: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub preference: Option<ProviderId>,
    #[serde(default)]
    pub metadata: RequestMetadata,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub segment_id: Option<String>,
}

/// Lifetime/within-cycle token totals, the concrete shape of
/// `getUsageTotals`/`getCumulativeTotals`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Outbound response from `Router::generate`.
///
/// §6 requires external payload compatibility with both snake_case and
/// camelCase key sets for the usage totals, so this type carries a hand-
/// written [`Serialize`] impl rather than a derive — a derive can rename
/// individual fields but can't emit the same value under two different keys.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub total_tokens: u64,
    pub model: String,
    pub provider: ProviderId,
    pub usage_totals: UsageTotals,
    pub cumulative_totals: UsageTotals,
    /// Present (and `true`) only on the synthetic dry-run path (§6); the
    /// external key is `dryRun`, not `dry_run`.
    pub dry_run: Option<bool>,
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let len = if self.dry_run.is_some() { 11 } else { 10 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("text", &self.text)?;
        map.serialize_entry("tokens_in", &self.tokens_in)?;
        map.serialize_entry("tokens_out", &self.tokens_out)?;
        map.serialize_entry("total_tokens", &self.total_tokens)?;
        map.serialize_entry("model", &self.model)?;
        map.serialize_entry("provider", &self.provider)?;
        map.serialize_entry("usage_totals", &self.usage_totals)?;
        map.serialize_entry("cumulative_totals", &self.cumulative_totals)?;
        map.serialize_entry("usageTotals", &self.usage_totals)?;
        map.serialize_entry("cumulativeTotals", &self.cumulative_totals)?;
        if let Some(dry_run) = self.dry_run {
            map.serialize_entry("dryRun", &dry_run)?;
        }
        map.end()
    }
}

/// One entry in the attempt list accumulated while trying candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub provider: ProviderId,
    /// Either a short reason tag (`token_cap`, `circuit_open`, `paid_disabled`)
    /// or a rendered underlying error message.
    pub reason: String,
}

impl FailureRecord {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn reason_or_message(&self) -> &str {
        &self.reason
    }
}

/// The concrete Rust shape of the adapter's `summarise` input (§6).
#[derive(Debug, Clone, Default)]
pub struct AdapterRequest {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub endpoint: Option<String>,
    pub text: String,
    pub language: String,
    pub model: String,
}

/// The concrete Rust shape of the adapter's `summarise` output (§6).
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub summary: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub model: Option<String>,
}
