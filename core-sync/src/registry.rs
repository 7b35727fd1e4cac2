//! # Source Registry
//!
//! Explicit mapping from a provider-type tag to a source adapter factory.
//!
//! The registry is a plain value, populated once at process start and passed
//! by reference into the orchestrator — no hidden global state, and tests can
//! inject their own factories.

use crate::error::{Result, SyncError};
use core_store::{DataProvider, PropertyMap};
use source_traits::DataSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a source adapter from a provider's configuration properties.
pub type SourceFactory =
    Arc<dyn Fn(&PropertyMap) -> source_traits::Result<Arc<dyn DataSource>> + Send + Sync>;

/// Registry of source adapter factories keyed by provider type tag.
#[derive(Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a provider type tag, replacing any previous one.
    pub fn register(&mut self, tag: impl Into<String>, factory: SourceFactory) {
        let tag = tag.into();
        info!(tag = %tag, "Registered source adapter factory");
        self.factories.insert(tag, factory);
    }

    /// Build the adapter for a registered provider.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownProviderType`] when no factory is
    /// registered for the provider's type tag, or the factory's own error
    /// when the configuration is invalid.
    pub fn build(&self, provider: &DataProvider) -> Result<Arc<dyn DataSource>> {
        let factory = self
            .factories
            .get(&provider.provider_type)
            .ok_or_else(|| SyncError::UnknownProviderType(provider.provider_type.clone()))?;

        Ok(factory(&provider.properties.0)?)
    }

    /// Registered type tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }
}
