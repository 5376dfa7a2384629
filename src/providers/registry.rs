//! Provider registry.
//!
//! The `ProviderRegistry` owns the set of live adapters in registration
//! order (index 0 = first registered = tried first). The router walks this
//! order when building its candidate queue, so for a given configured key
//! set the selection is deterministic.
//!
//! Registration is idempotent on name: re-registering a name replaces the
//! adapter in place, keeping its position. In practice registration happens
//! once per adapter at startup, after which the registry is read-only.

use std::sync::Arc;

use tracing::info;

use super::traits::ProviderAdapter;

/// Ordered set of provider adapters, keyed by name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter.
    ///
    /// A new name is appended (lowest priority); an existing name is
    /// replaced in place (last write wins).
    pub fn register(&mut self, provider: Arc<dyn ProviderAdapter>) {
        let name = provider.name().to_string();
        if let Some(slot) = self.providers.iter_mut().find(|p| p.name() == name) {
            *slot = provider;
        } else {
            self.providers.push(provider);
        }
        info!(provider = %name, "registered provider");
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// All adapters in registration order.
    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    /// Registered provider names, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
