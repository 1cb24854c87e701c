//! Static provider registry and alias resolution (§4.1).
//!
//! The table is fixed at construction time — this mirrors the ancestor SDK's
//! `create_provider` factory, except keyed by a small metadata struct instead
//! of a match arm per provider, since the router never constructs adapters
//! itself (callers own the factory, see [`crate::adapter::AdapterFactory`]).

use std::collections::HashMap;

use crate::models::{ProviderId, ProviderMetadata, ProviderTier};

/// Maps provider identifiers to their fixed metadata, and resolves aliases
/// and legacy ids.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    metadata: HashMap<ProviderId, ProviderMetadata>,
    aliases: HashMap<String, ProviderId>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// The built-in default table (§4.1 "Supplemented default table"),
    /// covering every provider id named in this spec's scenarios.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("ollama", ProviderTier::Local, false, "ollama");
        registry.register("huggingface_free", ProviderTier::Free, false, "huggingface");
        registry.register("gemini_free", ProviderTier::Free, true, "gemini");
        registry.register("gemini_paid", ProviderTier::Paid, true, "gemini");
        registry.register("openai_paid", ProviderTier::Paid, true, "openai");
        registry.register("anthropic_paid", ProviderTier::Paid, true, "anthropic");
        registry.alias("gemini", "gemini_paid");
        registry.alias("openai", "openai_paid");
        registry.alias("anthropic", "anthropic_paid");
        registry
    }

    pub fn register(
        &mut self,
        canonical: impl Into<String>,
        tier: ProviderTier,
        requires_key: bool,
        adapter_kind: impl Into<String>,
    ) {
        self.metadata.insert(
            canonical.into(),
            ProviderMetadata {
                tier,
                requires_key,
                adapter_kind: adapter_kind.into(),
            },
        );
    }

    pub fn alias(&mut self, alias: impl Into<String>, canonical: impl Into<ProviderId>) {
        self.aliases.insert(alias.into(), canonical.into());
    }

    /// Trims, lower-cases, and maps known aliases; returns the normalised
    /// input unchanged if no alias is registered for it.
    pub fn resolve(&self, id: &str) -> ProviderId {
        let normalised = id.trim().to_lowercase();
        self.aliases
            .get(&normalised)
            .cloned()
            .unwrap_or(normalised)
    }

    /// Defaults to `{paid, requiresKey:true, adapterKind=canonical}` when the
    /// id has no registered metadata, per §4.1 and the §9 open question on
    /// unknown preferences being synthesised as paid.
    pub fn metadata(&self, canonical: &str) -> ProviderMetadata {
        self.metadata.get(canonical).cloned().unwrap_or_else(|| ProviderMetadata {
            tier: ProviderTier::Paid,
            requires_key: true,
            adapter_kind: canonical.to_string(),
        })
    }

    /// Strips `_paid`/`_trial`/`_free` suffixes to find the bare name used
    /// by older stored credentials.
    pub fn legacy_id_of(&self, canonical: &str) -> Option<ProviderId> {
        for suffix in ["_paid", "_trial", "_free"] {
            if let Some(bare) = canonical.strip_suffix(suffix) {
                return Some(bare.to_string());
            }
        }
        None
    }

    pub fn is_known(&self, canonical: &str) -> bool {
        self.metadata.contains_key(canonical)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_alias() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.resolve("Gemini"), "gemini_paid");
        assert_eq!(registry.resolve("  OpenAI "), "openai_paid");
    }

    #[test]
    fn unknown_id_passes_through() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.resolve("mystery_provider"), "mystery_provider");
    }

    #[test]
    fn unknown_metadata_defaults_to_paid_requires_key() {
        let registry = ProviderRegistry::with_defaults();
        let meta = registry.metadata("mystery_provider");
        assert_eq!(meta.tier, ProviderTier::Paid);
        assert!(meta.requires_key);
        assert_eq!(meta.adapter_kind, "mystery_provider");
    }

    #[test]
    fn legacy_id_strips_tier_suffix() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.legacy_id_of("gemini_paid"), Some("gemini".to_string()));
        assert_eq!(registry.legacy_id_of("ollama"), None);
    }
}
