//! Provider registry.

use crate::config::ConfigResolver;
use crate::image::provider::ImageProvider;
use crate::image::providers::{builtin_factories, ProviderFactory};
use crate::image::types::Capability;
use std::sync::Arc;

/// Name-keyed collection of usable providers, in registration order.
///
/// Built once at startup and only read afterwards.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from the built-in providers whose API key resolves.
    pub fn from_resolver(resolver: &ConfigResolver) -> Self {
        Self::from_factories(resolver, &builtin_factories())
    }

    /// Builds a registry from `factories`, skipping those without a credential.
    pub fn from_factories(resolver: &ConfigResolver, factories: &[ProviderFactory]) -> Self {
        let mut registry = Self::new();
        for factory in factories {
            let Some(api_key) = resolver.resolve_api_key(factory.name) else {
                tracing::debug!(provider = factory.name, "no API key, skipping provider");
                continue;
            };
            match (factory.build)(api_key) {
                Ok(provider) => registry.register(provider),
                Err(e) => {
                    tracing::warn!(provider = factory.name, "failed to initialize provider: {e}")
                }
            }
        }
        registry
    }

    /// Registers a provider. A provider with the same name is replaced in place.
    pub fn register(&mut self, provider: Arc<dyn ImageProvider>) {
        let name = provider.name().to_string();
        match self.providers.iter_mut().find(|p| p.name() == name) {
            Some(slot) => {
                tracing::debug!(provider = %name, "replacing registered provider");
                *slot = provider;
            }
            None => {
                tracing::debug!(provider = %name, "registered provider");
                self.providers.push(provider);
            }
        }
    }

    /// Looks up a provider by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Returns all providers in registration order.
    pub fn list(&self) -> &[Arc<dyn ImageProvider>] {
        &self.providers
    }

    /// Returns the providers advertising `capability`, in registration order.
    pub fn find_with_capability(&self, capability: Capability) -> Vec<Arc<dyn ImageProvider>> {
        self.providers
            .iter()
            .filter(|p| p.supports(capability))
            .cloned()
            .collect()
    }

    /// Returns provider names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Returns true if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
