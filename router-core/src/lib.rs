//! # Router Core
//!
//! The LLM routing engine at the heart of a browser-extension text-to-speech
//! service: it picks among third-party generative-AI providers for a single
//! summarisation request, authenticates to whichever one it picks, enforces
//! a token budget, isolates repeat offenders with a circuit breaker, retries
//! transient failures with backoff, and hands back one normalised response.
//!
//! It does not speak HTTP to providers directly (adapters do that — see
//! [`adapter::Adapter`]), does not rank providers by observed latency
//! (ordering is configured), and does not stream; every call resolves to one
//! final summary.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use router_core::{Router, ProviderRegistry};
//! use router_core::router::AgentConfig;
//! use router_core::models::{Request, RoutingConfig};
//! use std::sync::Arc;
//!
//! # async fn run(adapter_factory: Arc<dyn router_core::adapter::AdapterFactory>) -> Result<(), router_core::error::RouterError> {
//! let router = Router::new(ProviderRegistry::with_defaults(), adapter_factory);
//! router.set_agent_config(AgentConfig {
//!     routing: RoutingConfig {
//!         provider_order: vec!["gemini_paid".into(), "openai_paid".into()],
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! }).await;
//!
//! let response = router.generate(Request {
//!     text: "Page contents to summarise...".into(),
//!     language: "en".into(),
//!     preference: Some("ollama".into()),
//!     metadata: Default::default(),
//! }).await?;
//! println!("{} (via {})", response.text, response.provider);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! - [`registry`] — provider id canonicalisation and the fixed metadata table.
//! - [`credential`] — API key lookup and the non-cryptographic key-identity hash.
//! - [`vertex`] — the one real HTTP call this crate makes: Google's OAuth2 JWT-bearer exchange.
//! - [`cost_tracker`] — the token-budget admission contract, plus an in-memory reference implementation.
//! - [`health`] — the per-provider circuit breaker.
//! - [`retry`] — the backoff-and-timeout executor wrapping each adapter call.
//! - [`adapter`] — the trait external provider adapters implement.
//! - [`router`] — the orchestrator tying all of the above together.

pub mod adapter;
pub mod cost_tracker;
pub mod credential;
pub mod error;
pub mod health;
pub mod models;
pub mod registry;
pub mod retry;
pub mod router;
pub mod vertex;

pub use adapter::{Adapter, AdapterFactory};
pub use cost_tracker::{CostTracker, CostTrackerError, InMemoryCostTracker};
pub use error::{AdapterError, RouterError};
pub use models::{Request, Response};
pub use registry::ProviderRegistry;
pub use router::{AgentConfig, Router};
