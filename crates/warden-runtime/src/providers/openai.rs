//! OpenAI-compatible chat completions backend.
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! with the OpenAI request/response shape.
//!
//! ## Security
//!
//! The API key is held in an [`ApiCredential`] and only exposed when the
//! `Authorization` header is set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{
    factory::BackendFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatCompletionRequest, ChatMessage, CompletionResult, GenerationBackend, ModelId,
    ProviderError, ResponseFormat,
};

/// Environment variable name for the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible backend.
pub struct OpenAiCompatibleBackend {
    credential: ApiCredential,
    base_url: String,
    default_model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiCompatibleBackend {
    /// Create a backend with an explicit key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "OpenAI API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: build_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Create from JSON settings with environment fallback for the key.
    ///
    /// Recognised keys: `api_key`, `base_url`, `model`, `timeout` (humantime, e.g. "20s").
    pub fn from_config(settings: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            settings,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;

        let base_url = settings["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let default_model = settings["model"]
            .as_str()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let timeout = match settings["timeout"].as_str() {
            Some(raw) => humantime::parse_duration(raw)
                .map_err(|e| ProviderError::NotConfigured(format!("invalid timeout '{}': {}", raw, e)))?,
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            credential,
            base_url,
            default_model,
            timeout,
            client: build_client(timeout)?,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::HttpError(e.to_string()))
}

/// Request body.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    fn is_configured(&self) -> bool {
        !self.credential.is_empty()
    }

    fn resolve_model(&self, requested: Option<&str>) -> ModelId {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) => ModelId::new(model),
            None => ModelId::new(self.default_model.clone()),
        }
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<CompletionResult, ProviderError> {
        let body = WireRequest {
            model: request.model.as_str(),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: match request.response_format {
                ResponseFormat::Json => Some(WireResponseFormat { type_: "json_object" }),
                ResponseFormat::Text => None,
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = response
                .json::<WireError>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|e| format!("unreadable error body: {}", e));

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<CompletionResult>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for [`OpenAiCompatibleBackend`].
///
/// ## Settings
/// ```json
/// {
///   "api_key": "sk-...",                 // Optional, falls back to OPENAI_API_KEY
///   "base_url": "https://...",           // Optional, any compatible endpoint
///   "model": "gpt-4o-mini",              // Optional default model
///   "timeout": "30s"                     // Optional HTTP timeout
/// }
/// ```
pub struct OpenAiBackendFactory;

impl BackendFactory for OpenAiBackendFactory {
    fn backend_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn GenerationBackend>, ProviderError> {
        Ok(Arc::new(OpenAiCompatibleBackend::from_config(settings)?))
    }

    fn validate_settings(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in settings or {} env",
                OPENAI_API_KEY_ENV
            )));
        }

        if let Some(url) = settings["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions backend"
    }
}
