//! The adapter contract consumed by the router (§4.1 "Adapter Interface",
//! §6 "Adapter contract consumed by the router", §9 "Dynamic dispatch").
//!
//! Implementations live outside this crate — provider adapters are an
//! explicit external collaborator (§1). This module only defines the trait
//! object shape and the factory the router uses to construct and cache one
//! instance per canonical provider id, mirroring the ancestor SDK's
//! `Provider` trait and `create_provider` factory but generalised to this
//! spec's single `summarise` capability instead of chat/embedding/image/etc.

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::models::{AdapterRequest, AdapterResponse};

/// One provider's protocol, reduced to the single capability the router
/// needs: turn source text into a summary.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn summarise(&self, request: AdapterRequest) -> Result<AdapterResponse, AdapterError>;
}

/// Constructs an [`Adapter`] for a given adapter kind (e.g. `"gemini"`,
/// `"openai"`, `"ollama"`). The router calls this at most once per canonical
/// provider id and caches the result (§3 "Lifecycle").
pub trait AdapterFactory: Send + Sync {
    fn create(&self, adapter_kind: &str) -> Result<std::sync::Arc<dyn Adapter>, AdapterError>;
}
