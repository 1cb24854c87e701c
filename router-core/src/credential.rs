//! Credential resolution and key-identity hashing (§4.2).
//!
//! The "primary store" and "legacy-alias store" are out of scope as actual
//! persistent stores (§1); here they're a `HashMap` the host populates,
//! standing in for whatever out-of-process secret store a real deployment
//! would query.

use std::collections::HashMap;

use crate::models::ProviderId;
use crate::registry::ProviderRegistry;

/// Modulus for the rolling polynomial digest: the largest Mersenne prime
/// that fits in 31 bits, chosen so the digest itself always fits in an `i64`
/// without sign ambiguity.
const HASH_MODULUS: i64 = (1i64 << 31) - 1;
const HASH_BASE: i64 = 31;

/// A deterministic positive integer digest of a secret, used only to detect
/// when a credential changes identity — never as a credential itself, and
/// never logged next to the plaintext key (§9).
pub fn key_hash(secret: &str) -> i64 {
    let mut hash: i64 = 0;
    for byte in secret.as_bytes() {
        hash = (hash * HASH_BASE + *byte as i64) % HASH_MODULUS;
    }
    hash
}

/// Looks up credentials for a provider: primary store, then legacy-alias
/// store, then an environment variable named by the provider's config.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    primary: HashMap<ProviderId, String>,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: HashMap<ProviderId, String>) -> Self {
        Self { primary: store }
    }

    pub fn set_key(&mut self, provider: impl Into<ProviderId>, secret: impl Into<String>) {
        self.primary.insert(provider.into(), secret.into());
    }

    /// First hit wins: primary store for `provider`, primary store for
    /// `legacyIdOf(provider)`, then `env_var` if given.
    pub fn resolve_api_key(
        &self,
        provider: &str,
        registry: &ProviderRegistry,
        env_var: Option<&str>,
    ) -> Option<String> {
        if let Some(secret) = self.primary.get(provider) {
            return Some(secret.clone());
        }
        if let Some(legacy) = registry.legacy_id_of(provider) {
            if let Some(secret) = self.primary.get(&legacy) {
                return Some(secret.clone());
            }
        }
        if let Some(var) = env_var {
            if let Ok(secret) = std::env::var(var) {
                if !secret.is_empty() {
                    return Some(secret);
                }
            }
        }
        None
    }
}
