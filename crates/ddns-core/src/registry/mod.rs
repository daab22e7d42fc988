//! Plugin-based provider registry
//!
//! The registry allows DNS providers and IP sources to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddns_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! ddns_provider_cloudflare::register(&registry);
//! ddns_ip_http::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider)?;
//! let ip_source = registry.create_ip_source(&config.ip_source)?;
//! ```

use crate::config::{IpSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, IpSource, IpSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Provider registry for plugin-based component creation
///
/// The registry maintains maps of type names to factory objects, allowing
/// dynamic instantiation of providers and IP sources based on configuration.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered IP source factories
    ip_sources: RwLock<HashMap<String, Box<dyn IpSourceFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory under `name` (e.g. "cloudflare")
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register an IP source factory under `name` (e.g. "http")
    pub fn register_ip_source(&self, name: impl Into<String>, factory: Box<dyn IpSourceFactory>) {
        let mut sources = self
            .ip_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create an IP source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpSource>)`: Created IP source instance
    /// - `Err(Error)`: If source type is not registered or creation fails
    pub fn create_ip_source(&self, config: &IpSourceConfig) -> Result<Box<dyn IpSource>> {
        let source_type = config.type_name();
        let sources = self
            .ip_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown IP source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered IP source types
    pub fn list_ip_sources(&self) -> Vec<String> {
        let sources = self
            .ip_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if an IP source type is registered
    pub fn has_ip_source(&self, name: &str) -> bool {
        let sources = self
            .ip_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
