//! # warden-runtime
//!
//! The guarded generation gateway and the features built on it.
//!
//! Every call to a text-generation backend goes through
//! [`GuardedGenerator`], which screens the prompt, makes exactly one
//! backend call, and screens the trimmed response. Consumers use a
//! [`FallbackAdapter`](adapters::FallbackAdapter) so that any stop or
//! failure becomes a safe, user-visible result instead of an error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_runtime::{generator_from_config, FormReviewAdapter, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("warden.yaml")?;
//! let reviewer = FormReviewAdapter::new(Arc::new(generator_from_config(&config)?));
//!
//! // Never fails: blocked or broken reviews come back as one "general" suggestion.
//! let suggestions = reviewer.review(&request).await;
//! ```

use std::sync::Arc;

use warden_core::PolicyPack;

pub mod adapters;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapters::{
    run_guarded, AdapterParseError, FallbackAdapter, FormReviewAdapter, FormReviewRequest, Guarded,
    LegalTermAdapter,
};
pub use cache::{CachedFormReview, ReviewCache};
pub use cancel::{CancellationHandle, CancellationSignal};
pub use config::{ConfigError, RuntimeConfig};
pub use error::{GuardedGenerationError, GuardrailViolation};
pub use evaluator::{EvaluatorError, HeuristicEvaluator, PolicyEvaluator};
pub use orchestrator::{
    GenerationDefaults, GenerationOptions, GuardedGenerator, GuardedGeneratorBuilder,
};
pub use providers::{
    BackendRegistry, DisabledBackend, GenerationBackend, ProviderError, ResponseFormat,
};

/// Load the policy pack named by `config`, or the built-in one.
pub fn policy_from_config(config: &RuntimeConfig) -> Result<PolicyPack, ConfigError> {
    match &config.policy_file {
        Some(path) => PolicyPack::from_file(path).map_err(|e| ConfigError::InvalidPolicy {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
        None => Ok(PolicyPack::builtin()),
    }
}

/// Build a generator from configuration with the built-in backends.
pub fn generator_from_config(config: &RuntimeConfig) -> Result<GuardedGenerator, ConfigError> {
    generator_with_registry(config, &BackendRegistry::with_defaults())
}

/// Build a generator from configuration, creating the backend from `registry`.
///
/// A backend that is known but lacks credentials is replaced by
/// [`DisabledBackend`], so the gateway still starts and every request
/// reports itself unavailable. An unknown backend type is an error.
pub fn generator_with_registry(
    config: &RuntimeConfig,
    registry: &BackendRegistry,
) -> Result<GuardedGenerator, ConfigError> {
    let evaluator = HeuristicEvaluator::new(policy_from_config(config)?);

    let backend_type = config.backend.backend_type.as_str();
    if !registry.has_backend(backend_type) {
        return Err(ConfigError::MissingComponent {
            component: format!("backend '{}'", backend_type),
            message: format!("unknown type, available: {:?}", registry.available_types()),
        });
    }

    let backend: Arc<dyn GenerationBackend> =
        match registry.create(backend_type, &config.backend.settings_json()) {
            Ok(backend) => backend,
            Err(ProviderError::NotConfigured(reason)) => {
                tracing::warn!(backend = backend_type, %reason, "Backend not configured, generation disabled");
                Arc::new(DisabledBackend)
            }
            Err(e) => {
                return Err(ConfigError::MissingComponent {
                    component: format!("backend '{}'", backend_type),
                    message: e.to_string(),
                })
            }
        };

    tracing::info!(
        backend = backend.name(),
        configured = backend.is_configured(),
        evaluator = evaluator.name(),
        "Guarded generator ready"
    );

    GuardedGenerator::builder()
        .evaluator(Arc::new(evaluator))
        .backend(backend)
        .defaults(GenerationDefaults::from(config))
        .build()
}
