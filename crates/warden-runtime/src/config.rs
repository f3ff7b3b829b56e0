//! Runtime configuration.
//!
//! ```yaml
//! default_model: gpt-4o-mini
//! request_timeout: 20s
//! backend:
//!   type: openai
//!   base_url: https://api.openai.com/v1
//! policy_file: policies/platform.yaml
//! cache:
//!   max_entries: 500
//!   ttl: 10m
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Environment variable overriding `request_timeout` (humantime, e.g. "15s").
pub const REQUEST_TIMEOUT_ENV: &str = "WARDEN_REQUEST_TIMEOUT";

/// Environment variable overriding `default_model`.
pub const MODEL_ENV: &str = "WARDEN_MODEL";

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a careful assistant for a legal document platform. \
     Explain clearly, do not give legal advice, and never promise outcomes.";

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid duration for {field}: {message}")]
    InvalidDuration { field: String, message: String },

    #[error("Invalid config value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid policy pack {path}: {message}")]
    InvalidPolicy { path: String, message: String },

    #[error("Could not build {component}: {message}")]
    MissingComponent { component: String, message: String },
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Model used when a request names none. `None` defers to the backend's default.
    pub default_model: Option<String>,

    /// System prompt used when a request carries none.
    pub default_system_prompt: String,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    /// Budget for a whole request, shared by both screening stages and the backend call.
    #[serde(with = "duration_human")]
    pub request_timeout: Duration,

    pub backend: BackendConfig,

    /// Policy pack to load instead of the built-in one.
    pub policy_file: Option<PathBuf>,

    pub cache: CacheConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: None,
            max_tokens: None,
            request_timeout: Duration::from_secs(30),
            backend: BackendConfig::default(),
            policy_file: None,
            cache: CacheConfig::default(),
        }
    }
}

/// Backend selection. Every key besides `type` is handed to the backend factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,

    #[serde(flatten)]
    pub settings: serde_json::Map<String, JsonValue>,
}

fn default_backend_type() -> String {
    "disabled".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            settings: serde_json::Map::new(),
        }
    }
}

impl BackendConfig {
    /// Settings as a JSON object, for [`BackendRegistry::create`](crate::providers::BackendRegistry::create).
    pub fn settings_json(&self) -> JsonValue {
        JsonValue::Object(self.settings.clone())
    }
}

/// Review cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(600),
        }
    }
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(REQUEST_TIMEOUT_ENV) {
            self.request_timeout =
                humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::InvalidDuration {
                    field: REQUEST_TIMEOUT_ENV.to_string(),
                    message: e.to_string(),
                })?;
        }

        if let Some(model) = lookup(MODEL_ENV).filter(|m| !m.trim().is_empty()) {
            self.default_model = Some(model.trim().to_string());
        }

        self.validate()
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration {
                field: "request_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidValue {
                    field: "temperature".to_string(),
                    message: format!("{} is outside 0.0..=2.0", temperature),
                });
            }
        }

        if self.backend.backend_type.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backend.type".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
