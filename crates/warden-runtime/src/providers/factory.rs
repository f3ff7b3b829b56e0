//! Backend factories, so configuration can name a backend by type.
//!
//! ```ignore
//! let registry = BackendRegistry::with_defaults();
//! let backend = registry.create("openai", &settings)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{DisabledBackend, GenerationBackend, ProviderError};

/// Creates backends of one type from JSON settings.
pub trait BackendFactory: Send + Sync {
    /// Unique type name, e.g. "openai" or "disabled".
    fn backend_type(&self) -> &'static str;

    /// Create a backend instance.
    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn GenerationBackend>, ProviderError>;

    /// Validate settings without creating a backend.
    fn validate_settings(&self, settings: &JsonValue) -> Result<(), ProviderError>;

    fn description(&self) -> &'static str {
        "Generation backend"
    }
}

/// Factory for [`DisabledBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackendFactory;

impl BackendFactory for DisabledBackendFactory {
    fn backend_type(&self) -> &'static str {
        "disabled"
    }

    fn create(&self, _settings: &JsonValue) -> Result<Arc<dyn GenerationBackend>, ProviderError> {
        Ok(Arc::new(DisabledBackend))
    }

    fn validate_settings(&self, _settings: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Generation switched off; every request fails fast as unconfigured"
    }
}

/// Registry of backend factories keyed by type name.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any with the same type name.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories
            .insert(factory.backend_type().to_string(), factory);
    }

    /// Create a backend by type name.
    pub fn create(
        &self,
        backend_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn GenerationBackend>, ProviderError> {
        self.factory(backend_type)?.create(settings)
    }

    /// Validate settings for a backend type.
    pub fn validate(&self, backend_type: &str, settings: &JsonValue) -> Result<(), ProviderError> {
        self.factory(backend_type)?.validate_settings(settings)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_backend(&self, backend_type: &str) -> bool {
        self.factories.contains_key(backend_type)
    }

    fn factory(&self, backend_type: &str) -> Result<&Arc<dyn BackendFactory>, ProviderError> {
        self.factories.get(backend_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown backend type: '{}'. Available: {:?}",
                backend_type,
                self.available_types()
            ))
        })
    }

    /// Registry with every built-in backend compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DisabledBackendFactory));
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiBackendFactory));
        registry
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.available_types())
            .finish()
    }
}
