//! Router Orchestrator (§4.7, §4.8): builds the candidate order, applies
//! filters, invokes adapters under retry/timeout, and aggregates failures.
//!
//! Grounded structurally on the ancestor SDK's `UltrafastClient` in
//! `client.rs` — a single struct owning the provider map, metrics, and retry
//! policy behind locks, with a cache-check / route / invoke / record
//! pipeline in `standalone_chat_completion` — generalised here to this
//! spec's tiered candidate list and provider-health bookkeeping instead of
//! the SDK's load-balancing `Router`/`RoutingStrategy`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::Instrument;

use crate::adapter::{Adapter, AdapterFactory};
use crate::cost_tracker::{CostTracker, InMemoryCostTracker};
use crate::credential::{key_hash, CredentialResolver};
use crate::error::RouterError;
use crate::health::HealthTable;
use crate::models::{
    AdapterRequest, FailureRecord, GeminiConfig, ProviderConfig, ProviderId, ProviderMetadata,
    ProviderTier, Request, Response, RoutingConfig, UsageTotals,
};
use crate::registry::ProviderRegistry;
use crate::retry::{execute_with_retry, Outcome};
use crate::vertex::VertexTokenService;

/// Bundles everything `setAgentConfig` replaces in one call: routing
/// defaults, the Gemini block, and the per-provider blocks (§6
/// "Configuration inputs").
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub routing: RoutingConfig,
    pub gemini: GeminiConfig,
    pub providers: HashMap<ProviderId, ProviderConfig>,
}

struct InvocationContext {
    api_key: Option<String>,
    access_token: Option<String>,
    project: Option<String>,
    location: Option<String>,
    endpoint: Option<String>,
    key_hash: Option<i64>,
}

impl InvocationContext {
    fn none() -> Self {
        Self {
            api_key: None,
            access_token: None,
            project: None,
            location: None,
            endpoint: None,
            key_hash: None,
        }
    }
}

enum Attempt {
    Success(Response),
    Skip(&'static str),
    Fail(RouterError),
}

/// Owns the health table, adapter cache, provider-config cache, and Vertex
/// token slot for one process (§3 "Ownership", §9 "typed owners"). A single
/// value is constructed by the host and shared (e.g. behind an `Arc`) across
/// concurrently running requests.
pub struct Router {
    registry: ProviderRegistry,
    credentials: RwLock<CredentialResolver>,
    health: HealthTable,
    adapter_factory: Arc<dyn AdapterFactory>,
    adapter_cache: RwLock<HashMap<ProviderId, Arc<dyn Adapter>>>,
    provider_config_cache: RwLock<HashMap<ProviderId, ProviderConfig>>,
    vertex: VertexTokenService,
    cost_tracker: RwLock<Arc<dyn CostTracker>>,
    config: RwLock<AgentConfig>,
}

impl Router {
    pub fn new(registry: ProviderRegistry, adapter_factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            registry,
            credentials: RwLock::new(CredentialResolver::new()),
            health: HealthTable::new(),
            adapter_factory,
            adapter_cache: RwLock::new(HashMap::new()),
            provider_config_cache: RwLock::new(HashMap::new()),
            vertex: VertexTokenService::new(),
            cost_tracker: RwLock::new(Arc::new(InMemoryCostTracker::default())),
            config: RwLock::new(AgentConfig::default()),
        }
    }

    pub async fn set_credential_store(&self, store: HashMap<ProviderId, String>) {
        *self.credentials.write().await = CredentialResolver::with_store(store);
    }

    /// `setCostTracker(tracker)`.
    pub async fn set_cost_tracker(&self, tracker: Arc<dyn CostTracker>) {
        *self.cost_tracker.write().await = tracker;
    }

    /// `setAgentConfig(config)` — replaces routing defaults (and the Gemini
    /// / per-provider blocks bundled with them).
    pub async fn set_agent_config(&self, config: AgentConfig) {
        *self.config.write().await = config;
        self.clear_caches().await;
    }

    /// `clearCaches()` — evicts the adapter cache and the provider-config
    /// cache.
    pub async fn clear_caches(&self) {
        self.adapter_cache.write().await.clear();
        self.provider_config_cache.write().await.clear();
    }

    /// `generate(request) -> Response` (§4.7).
    ///
    /// Each call gets its own request id for tracing, the same role the
    /// ancestor gateway's `RequestContext` id plays across its request
    /// lifecycle — logged but never returned to the caller, since the
    /// external response shape (§6) doesn't carry one.
    pub async fn generate(&self, request: Request) -> Result<Response, RouterError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("generate", request_id = %request_id);
        self.generate_inner(request).instrument(span).await
    }

    async fn generate_inner(&self, request: Request) -> Result<Response, RouterError> {
        if request.text.trim().is_empty() {
            return Err(RouterError::EmptyText);
        }

        let config = self.config.read().await.clone();
        let candidates = self.build_candidate_order(&request, &config.routing);

        let mut failures = Vec::new();
        for candidate in candidates {
            match self.try_candidate(&candidate, &request, &config).await {
                Attempt::Success(response) => {
                    tracing::info!(provider = %response.provider, "request succeeded");
                    return Ok(response);
                }
                Attempt::Skip(reason) => {
                    tracing::debug!(provider = %candidate, reason, "candidate skipped");
                    failures.push(FailureRecord::new(candidate, reason));
                }
                Attempt::Fail(err) => {
                    tracing::warn!(provider = %candidate, error = %err, "candidate failed");
                    failures.push(FailureRecord::new(candidate, err.to_string()));
                    // §4.7 / §9: auth errors propagate immediately, terminating the
                    // whole request without trying remaining candidates. This
                    // reproduces the documented (possibly surprising) source
                    // behaviour verbatim rather than falling through.
                    if matches!(err, RouterError::AuthFailed { .. }) {
                        return Err(err);
                    }
                }
            }
        }

        if config.routing.disable_paid {
            Err(RouterError::PaidDisabled)
        } else {
            Err(RouterError::NoCandidates { attempts: failures })
        }
    }

    /// §4.7 step 3: ordered, de-duplicated candidate list from
    /// `providerOrder` plus preference placement.
    fn build_candidate_order(&self, request: &Request, routing: &RoutingConfig) -> Vec<ProviderId> {
        let mut order: Vec<ProviderId> = Vec::new();
        for raw in &routing.provider_order {
            if raw == "auto" {
                continue;
            }
            let canonical = self.registry.resolve(raw);
            if !self.registry.is_known(&canonical) {
                tracing::warn!(provider = %canonical, "unknown provider id in configured order, skipping");
                continue;
            }
            if !order.contains(&canonical) {
                order.push(canonical);
            }
        }

        if let Some(preference) = &request.preference {
            if preference != "auto" {
                let canonical = self.registry.resolve(preference);
                if !order.contains(&canonical) {
                    let meta = self.registry.metadata(&canonical);
                    if meta.tier != ProviderTier::Paid {
                        order.insert(0, canonical);
                    } else {
                        order.push(canonical);
                    }
                }
                // Already present via providerOrder: first position wins, no-op.
            }
        }

        order
    }

    async fn try_candidate(&self, candidate: &str, request: &Request, config: &AgentConfig) -> Attempt {
        let meta = self.registry.metadata(candidate);

        if config.routing.disable_paid && meta.tier == ProviderTier::Paid {
            return Attempt::Skip("paid_disabled");
        }
        if self.health.is_blocked(candidate).await {
            return Attempt::Skip("circuit_open");
        }

        let provider_config = self.load_provider_config(candidate, config).await;
        let model = resolve_model(&meta, &provider_config, &config.gemini);

        let tracker = self.cost_tracker.read().await.clone();
        let estimate = tracker.estimate_token_usage(&model, &request.text);
        let within_cap = config.routing.max_tokens_per_call == 0
            || estimate.total_tokens <= config.routing.max_tokens_per_call as u64;
        if !within_cap || !tracker.can_spend(estimate.total_tokens) {
            return Attempt::Skip("token_cap");
        }

        if config.routing.dry_run {
            return Attempt::Success(Response {
                text: String::new(),
                tokens_in: 0,
                tokens_out: 0,
                total_tokens: 0,
                model,
                provider: candidate.to_string(),
                usage_totals: tracker.usage_totals(),
                cumulative_totals: tracker.cumulative_totals(),
                dry_run: Some(true),
            });
        }

        let context = match self
            .build_invocation_context(candidate, &meta, &provider_config, &config.gemini)
            .await
        {
            Ok(context) => context,
            Err(err) => return Attempt::Fail(err),
        };

        let adapter = match self.adapter_for(candidate, &meta).await {
            Ok(adapter) => adapter,
            Err(err) => return Attempt::Fail(err),
        };

        let adapter_request = AdapterRequest {
            api_key: context.api_key,
            access_token: context.access_token,
            project: context.project,
            location: context.location,
            endpoint: context.endpoint,
            text: request.text.clone(),
            language: request.language.clone(),
            model: model.clone(),
        };

        let outcome = execute_with_retry(
            || {
                let adapter = adapter.clone();
                let req = adapter_request.clone();
                async move { adapter.summarise(req).await }
            },
            config.routing.timeout_ms,
            config.routing.retry_limit,
        )
        .await;

        match outcome {
            Outcome::Success(adapter_response) => {
                let prompt_tokens = adapter_response
                    .prompt_tokens
                    .unwrap_or_else(|| tracker.estimate_tokens_from_text(&request.text));
                let completion_tokens = adapter_response
                    .completion_tokens
                    .unwrap_or_else(|| tracker.estimate_tokens_from_text(&adapter_response.summary));

                // §7 "Success is atomic": only once the usage record itself
                // succeeds do we treat the candidate as having succeeded;
                // a recording failure is a provider failure for this
                // request, same as an adapter error would be.
                match tracker.record(&model, prompt_tokens, completion_tokens, candidate) {
                    Ok(recorded_total) => {
                        self.health.record_success(candidate).await;
                        if let Some(hash) = context.key_hash {
                            self.health.observe_key_hash(candidate, Some(hash)).await;
                        }
                        self.health.record_usage(candidate, prompt_tokens, completion_tokens).await;

                        let response_model = sanitize_model(adapter_response.model.unwrap_or(model));
                        Attempt::Success(Response {
                            text: adapter_response.summary,
                            tokens_in: prompt_tokens,
                            tokens_out: completion_tokens,
                            total_tokens: recorded_total,
                            model: response_model,
                            provider: candidate.to_string(),
                            usage_totals: tracker.usage_totals(),
                            cumulative_totals: tracker.cumulative_totals(),
                            dry_run: None,
                        })
                    }
                    Err(record_err) => {
                        self.health.record_failure(candidate).await;
                        Attempt::Fail(RouterError::RecordingFailed {
                            provider: candidate.to_string(),
                            message: record_err.to_string(),
                        })
                    }
                }
            }
            Outcome::AuthFailure(err) => {
                self.health.record_auth_failure(candidate).await;
                Attempt::Fail(RouterError::AuthFailed {
                    provider: candidate.to_string(),
                    message: err.message,
                })
            }
            Outcome::Exhausted(err) => {
                self.health.record_failure(candidate).await;
                Attempt::Fail(RouterError::AdapterTransient {
                    provider: candidate.to_string(),
                    message: err.message,
                })
            }
            Outcome::TimedOut => {
                self.health.record_failure(candidate).await;
                Attempt::Fail(RouterError::Timeout {
                    provider: candidate.to_string(),
                })
            }
        }
    }

    /// §4.8: resolves `{provider, auth}` for a candidate.
    async fn build_invocation_context(
        &self,
        candidate: &str,
        meta: &ProviderMetadata,
        provider_config: &ProviderConfig,
        gemini: &GeminiConfig,
    ) -> Result<InvocationContext, RouterError> {
        if !meta.requires_key {
            return Ok(InvocationContext::none());
        }

        let env_var = provider_config.api_key_env_var.as_deref();
        let api_key = self
            .credentials
            .read()
            .await
            .resolve_api_key(candidate, &self.registry, env_var);

        if meta.adapter_kind == "gemini" {
            if let Some(secret) = api_key {
                let hash = key_hash(&secret);
                self.health.observe_key_hash(candidate, Some(hash)).await;
                return Ok(InvocationContext {
                    api_key: Some(secret),
                    key_hash: Some(hash),
                    ..InvocationContext::none()
                });
            }

            let project = std::env::var(&gemini.project_env).unwrap_or_default();
            let location = std::env::var(&gemini.location_env).unwrap_or_default();
            if project.is_empty() || location.is_empty() {
                return Err(RouterError::MissingKey {
                    provider: candidate.to_string(),
                });
            }
            let credentials_path = std::env::var(&gemini.credentials_env).unwrap_or_default();
            let token = self.vertex.get_token(&credentials_path).await?;
            let endpoint = std::env::var(&gemini.vertex_endpoint_env).ok();

            return Ok(InvocationContext {
                access_token: Some(token),
                project: Some(project),
                location: Some(location),
                endpoint,
                ..InvocationContext::none()
            });
        }

        match api_key {
            Some(secret) => {
                let hash = key_hash(&secret);
                self.health.observe_key_hash(candidate, Some(hash)).await;
                Ok(InvocationContext {
                    api_key: Some(secret),
                    key_hash: Some(hash),
                    ..InvocationContext::none()
                })
            }
            None => Err(RouterError::MissingKey {
                provider: candidate.to_string(),
            }),
        }
    }

    async fn load_provider_config(&self, candidate: &str, config: &AgentConfig) -> ProviderConfig {
        if let Some(cached) = self.provider_config_cache.read().await.get(candidate) {
            return cached.clone();
        }
        let loaded = config.providers.get(candidate).cloned().unwrap_or_default();
        self.provider_config_cache
            .write()
            .await
            .insert(candidate.to_string(), loaded.clone());
        loaded
    }

    async fn adapter_for(&self, candidate: &str, meta: &ProviderMetadata) -> Result<Arc<dyn Adapter>, RouterError> {
        if let Some(cached) = self.adapter_cache.read().await.get(candidate) {
            return Ok(cached.clone());
        }
        let adapter = self.adapter_factory.create(&meta.adapter_kind).map_err(|e| {
            RouterError::AdapterTransient {
                provider: candidate.to_string(),
                message: e.message,
            }
        })?;
        self.adapter_cache
            .write()
            .await
            .insert(candidate.to_string(), adapter.clone());
        Ok(adapter)
    }

    pub async fn usage_totals(&self) -> UsageTotals {
        self.cost_tracker.read().await.usage_totals()
    }

    pub async fn cumulative_totals(&self) -> UsageTotals {
        self.cost_tracker.read().await.cumulative_totals()
    }
}

fn resolve_model(meta: &ProviderMetadata, provider_config: &ProviderConfig, gemini: &GeminiConfig) -> String {
    if !provider_config.model.is_empty() {
        return provider_config.model.clone();
    }
    if meta.adapter_kind == "gemini" {
        return if meta.tier == ProviderTier::Paid {
            gemini.default_model_paid.clone()
        } else {
            gemini.default_model_free.clone()
        };
    }
    meta.adapter_kind.clone()
}

/// If the adapter returns a slash-qualified id, only the last segment is
/// retained (§4.8).
fn sanitize_model(model: String) -> String {
    model.rsplit('/').next().unwrap_or(&model).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, AdapterFactory};
    use crate::error::AdapterError;
    use crate::models::AdapterResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedAdapter {
        summary: &'static str,
    }

    #[async_trait]
    impl Adapter for FixedAdapter {
        async fn summarise(&self, _req: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
            Ok(AdapterResponse {
                summary: self.summary.to_string(),
                prompt_tokens: Some(3),
                completion_tokens: Some(2),
                model: None,
            })
        }
    }

    struct FailingAdapter {
        status: Option<u16>,
    }

    #[async_trait]
    impl Adapter for FailingAdapter {
        async fn summarise(&self, _req: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
            Err(AdapterError::new(self.status, "nope"))
        }
    }

    struct SlowThenFastAdapter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Adapter for SlowThenFastAdapter {
        async fn summarise(&self, _req: AdapterRequest) -> Result<AdapterResponse, AdapterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            Ok(AdapterResponse {
                summary: "fast".to_string(),
                prompt_tokens: Some(1),
                completion_tokens: Some(1),
                model: None,
            })
        }
    }

    struct MapFactory(HashMap<&'static str, Arc<dyn Adapter>>);

    impl AdapterFactory for MapFactory {
        fn create(&self, kind: &str) -> Result<Arc<dyn Adapter>, AdapterError> {
            self.0
                .get(kind)
                .cloned()
                .ok_or_else(|| AdapterError::transient(format!("no adapter registered for {kind}")))
        }
    }

    fn request(text: &str, preference: Option<&str>) -> Request {
        Request {
            text: text.to_string(),
            language: "en".to_string(),
            preference: preference.map(|p| p.to_string()),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn s1_free_preference_wins() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("ollama", Arc::new(FixedAdapter { summary: "ok" }));
        factories.insert("gemini", Arc::new(FixedAdapter { summary: "ok" }));
        factories.insert("openai", Arc::new(FixedAdapter { summary: "ok" }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["gemini_paid".to_string(), "openai_paid".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let response = router.generate(request("hello", Some("ollama"))).await.unwrap();
        assert_eq!(response.provider, "ollama");
    }

    #[tokio::test]
    async fn s2_circuit_break_skip() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("openai", Arc::new(FixedAdapter { summary: "unused" }));
        factories.insert("anthropic", Arc::new(FixedAdapter { summary: "ok" }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_credential_store(HashMap::from([
                ("openai_paid".to_string(), "k1".to_string()),
                ("anthropic_paid".to_string(), "k2".to_string()),
            ]))
            .await;
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["openai_paid".to_string(), "anthropic_paid".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        for _ in 0..3 {
            router.health.record_failure("openai_paid").await;
        }

        let response = router.generate(request("hello", None)).await.unwrap();
        assert_eq!(response.provider, "anthropic_paid");
        assert_eq!(response.text, "ok");
    }

    #[tokio::test]
    async fn s3_paid_disabled_with_missing_adapter() {
        let factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["huggingface_free".to_string()],
                    disable_paid: true,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let err = router.generate(request("hello", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "No free providers available and paid disabled.");
    }

    #[tokio::test]
    async fn s4_timeout_then_retry_succeeds() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert(
            "ollama",
            Arc::new(SlowThenFastAdapter {
                calls: AtomicU32::new(0),
            }),
        );
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["ollama".to_string()],
                    timeout_ms: 50,
                    retry_limit: 1,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let response = router.generate(request("hello", None)).await.unwrap();
        assert_eq!(response.text, "fast");
        assert!(!router.health.is_blocked("ollama").await);
    }

    #[tokio::test]
    async fn s5_auth_failure_is_terminal() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("openai", Arc::new(FailingAdapter { status: Some(401) }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_credential_store(HashMap::from([("openai_paid".to_string(), "bad-key".to_string())]))
            .await;
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["openai_paid".to_string()],
                    retry_limit: 3,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let err = router.generate(request("hello", None)).await.unwrap_err();
        assert!(matches!(err, RouterError::AuthFailed { .. }));
        assert!(router.health.auth_invalid("openai_paid").await);
    }

    #[tokio::test]
    async fn dry_run_returns_synthetic_success() {
        let factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["ollama".to_string()],
                    dry_run: true,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let response = router.generate(request("hello", None)).await.unwrap();
        assert_eq!(response.dry_run, Some(true));
        assert_eq!(response.total_tokens, 0);
    }

    /// Invariant 2: a paid preference not already in `providerOrder` is
    /// appended at the end, not prepended. If it were prepended, `openai`
    /// would win here even though `ollama` (earlier in `providerOrder`) also
    /// succeeds.
    #[tokio::test]
    async fn paid_preference_is_appended_after_provider_order() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("ollama", Arc::new(FixedAdapter { summary: "ok" }));
        factories.insert("openai", Arc::new(FixedAdapter { summary: "ok" }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_credential_store(HashMap::from([("openai_paid".to_string(), "k1".to_string())]))
            .await;
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["ollama".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let response = router
            .generate(request("hello", Some("openai_paid")))
            .await
            .unwrap();
        assert_eq!(response.provider, "ollama");
    }

    /// Invariant 2, the non-paid counterpart already covered by
    /// `s1_free_preference_wins`: a non-paid preference is prepended ahead of
    /// `providerOrder`, so it wins even when a later candidate would also
    /// succeed. Restated here with two succeeding candidates to make the
    /// ordering claim, not just the preference claim, explicit.
    #[tokio::test]
    async fn non_paid_preference_is_prepended_before_provider_order() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("openai", Arc::new(FixedAdapter { summary: "ok" }));
        factories.insert("ollama", Arc::new(FixedAdapter { summary: "ok" }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_credential_store(HashMap::from([("openai_paid".to_string(), "k1".to_string())]))
            .await;
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["openai_paid".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let response = router.generate(request("hello", Some("ollama"))).await.unwrap();
        assert_eq!(response.provider, "ollama");
    }

    /// Invariant 7: when the estimated total exceeds a positive
    /// `maxTokensPerCall`, the candidate is skipped without the adapter ever
    /// being invoked. A `FailingAdapter` stands in for "would have errored
    /// loudly if called" — the `NoCandidates` failure list must carry the
    /// `token_cap` tag rather than the adapter's error message.
    #[tokio::test]
    async fn token_cap_skips_candidate_without_invoking_adapter() {
        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("ollama", Arc::new(FailingAdapter { status: None }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["ollama".to_string()],
                    max_tokens_per_call: 1,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let err = router
            .generate(request("a prompt with many more words than the cap allows", None))
            .await
            .unwrap_err();
        match err {
            RouterError::NoCandidates { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].reason, "token_cap");
            }
            other => panic!("expected NoCandidates, got {other:?}"),
        }
    }

    /// §7 "Success is atomic": a cost-tracker recording failure is surfaced
    /// as a provider failure, not a panic, and the circuit breaker counts it
    /// like any other failed attempt.
    #[tokio::test]
    async fn recording_failure_is_treated_as_a_provider_failure() {
        use crate::cost_tracker::FailingRecordTracker;

        let mut factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        factories.insert("ollama", Arc::new(FixedAdapter { summary: "ok" }));
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        router.set_cost_tracker(Arc::new(FailingRecordTracker)).await;
        router
            .set_agent_config(AgentConfig {
                routing: RoutingConfig {
                    provider_order: vec!["ollama".to_string()],
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;

        let err = router.generate(request("hello", None)).await.unwrap_err();
        match err {
            RouterError::NoCandidates { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert!(attempts[0].reason.contains("persistence backend unavailable"));
            }
            other => panic!("expected NoCandidates, got {other:?}"),
        }
        assert!(!router.health.is_blocked("ollama").await);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_immediately() {
        let factories: HashMap<&'static str, Arc<dyn Adapter>> = HashMap::new();
        let router = Router::new(ProviderRegistry::with_defaults(), Arc::new(MapFactory(factories)));
        let err = router.generate(request("   ", None)).await.unwrap_err();
        assert!(matches!(err, RouterError::EmptyText));
    }
}
