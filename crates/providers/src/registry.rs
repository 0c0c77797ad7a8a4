//! Name-keyed collection of provider adapters.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::kie::{KieConfig, KieProvider};
use crate::replicate::{ReplicateConfig, ReplicateProvider};

/// Looks up the adapter a task was submitted through.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own [`name`](ProviderAdapter::name),
    /// replacing any previous adapter with that name.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self.adapters
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Register every provider whose credentials are present in the
    /// environment.
    pub fn from_env() -> Result<Self, ProviderError> {
        let mut registry = Self::new();

        if let Some(config) = KieConfig::from_env() {
            registry.register(Arc::new(KieProvider::new(&config)?));
        }
        if let Some(config) = ReplicateConfig::from_env() {
            registry.register(Arc::new(ReplicateProvider::new(&config)?));
        }

        if registry.is_empty() {
            tracing::warn!("No provider credentials configured; submissions will be rejected");
        } else {
            tracing::info!(providers = ?registry.names(), "Providers registered");
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kie;
    use assert_matches::assert_matches;
    use std::time::Duration;

    // `assert_matches!` formats the whole `Result` on failure.
    impl std::fmt::Debug for dyn ProviderAdapter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("ProviderAdapter").field(&self.name()).finish()
        }
    }

    fn kie_provider() -> Arc<dyn ProviderAdapter> {
        let config = KieConfig {
            api_key: "test".into(),
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(1),
            callback_url: None,
        };
        Arc::new(KieProvider::new(&config).unwrap())
    }

    #[test]
    fn registered_adapter_is_found_by_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(kie_provider());
        assert!(registry.contains(kie::PROVIDER_NAME));
        assert_eq!(registry.get("kie").unwrap().name(), "kie");
        assert_eq!(registry.names(), vec!["kie"]);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ProviderRegistry::new();
        assert_matches!(
            registry.get("midjourney"),
            Err(ProviderError::UnknownProvider(name)) if name == "midjourney"
        );
    }
}
