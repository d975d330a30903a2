//! Provider registry and per-provider option whitelisting.

use super::{SearchOptions, SearchProvider};
use crate::error::SearchError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Keep only the option keys in `accepted`. Unknown keys are dropped silently.
pub fn filter_options(accepted: &[&str], options: &SearchOptions) -> SearchOptions {
    options
        .iter()
        .filter(|(key, _)| accepted.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Maps provider names to search providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn SearchProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider. Returns error if the name is already taken.
    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) -> Result<(), SearchError> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(SearchError::AlreadyRegistered { provider: name });
        }
        debug!(
            provider = %name,
            options = ?provider.accepted_options(),
            "Registering search provider"
        );
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Look up a provider, failing with `UnsupportedProvider` for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn SearchProvider>, SearchError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| SearchError::UnsupportedProvider {
                provider: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// The subset of `options` the named provider accepts.
    pub fn filter_options(
        &self,
        name: &str,
        options: &SearchOptions,
    ) -> Result<SearchOptions, SearchError> {
        let provider = self.get(name)?;
        Ok(filter_options(provider.accepted_options(), options))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MockSearchProvider;
    use serde_json::json;

    fn options(value: serde_json::Value) -> SearchOptions {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_filter_options_drops_unknown_keys() {
        let opts = options(json!({"max_results": 5, "topic": "news", "depth": "deep"}));
        let filtered = filter_options(&["max_results", "topic"], &opts);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered["max_results"], 5);
        assert!(!filtered.contains_key("depth"));
    }

    #[test]
    fn test_filter_options_empty_accepts_nothing() {
        let opts = options(json!({"max_results": 5}));
        assert!(filter_options(&[], &opts).is_empty());
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        registry
            .register(Arc::new(MockSearchProvider::new("mock")))
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("mock"));
        assert!(registry.get("mock").is_ok());
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(MockSearchProvider::new("mock")))
            .unwrap();
        let result = registry.register(Arc::new(MockSearchProvider::new("mock")));
        assert!(matches!(
            result,
            Err(SearchError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_get_unknown_is_unsupported() {
        let registry = ProviderRegistry::new();
        match registry.get("bing") {
            Err(SearchError::UnsupportedProvider { provider }) => assert_eq!(provider, "bing"),
            Err(other) => panic!("Expected UnsupportedProvider, got {:?}", other),
            Ok(_) => panic!("Expected UnsupportedProvider, got a provider"),
        }
    }

    #[test]
    fn test_registry_filter_options_uses_provider_whitelist() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(Arc::new(
                MockSearchProvider::new("mock").with_accepted_options(&["num_results"]),
            ))
            .unwrap();
        let opts = options(json!({"num_results": 3, "max_results": 9}));
        let filtered = registry.filter_options("mock", &opts).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered["num_results"], 3);
    }
}
