//! Generation backend abstractions for warden-runtime.
//!
//! This module defines the contract every text-generation backend
//! implements, plus the OpenAI-compatible wire shapes the contract is
//! expressed in. Concrete backends:
//!
//! - [`DisabledBackend`]: reports itself unconfigured; the gateway is off
//! - `OpenAiCompatibleBackend`: any `/chat/completions` endpoint (feature `openai`)
//!
//! ## Security
//!
//! All networked backends use the [`secrets`] module for credential handling.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{BackendFactory, BackendRegistry, DisabledBackendFactory};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiBackendFactory, OpenAiCompatibleBackend, OPENAI_API_KEY_ENV};

/// Errors from generation backends.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

/// A resolved model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Shape the caller wants the completion in. No safety meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A chat completion request, passed through to the backend unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: ModelId,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: ResponseFormat,
}

/// Message inside a completion choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One completion alternative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Raw result of a completion call: `{ choices: [...], model, usage }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl CompletionResult {
    /// A single-choice result carrying `content`.
    pub fn from_content(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            model: model.into(),
            choices: vec![CompletionChoice {
                index: 0,
                message: Some(ChoiceMessage {
                    role: Some("assistant".to_string()),
                    content: Some(content.into()),
                }),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }
}

/// Backend abstraction the gateway generates through.
///
/// # Gateway Constraint
/// The orchestrator is the ONLY caller. Adapters and evaluators never
/// reach a backend directly.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Whether the backend can serve requests at all.
    ///
    /// Must be cheap and side-effect free; the gateway checks it before
    /// any guardrail call.
    fn is_configured(&self) -> bool;

    /// Pick the model for a request.
    fn resolve_model(&self, requested: Option<&str>) -> ModelId;

    /// Execute one chat completion. Never retried by the gateway.
    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<CompletionResult, ProviderError>;

    /// Pull the generated text out of a result.
    fn extract_message_content(&self, result: &CompletionResult) -> Option<String> {
        result
            .choices
            .iter()
            .find_map(|choice| choice.message.as_ref()?.content.clone())
    }

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Backend used when generation is switched off.
#[derive(Debug, Clone, Default)]
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn is_configured(&self) -> bool {
        false
    }

    fn resolve_model(&self, requested: Option<&str>) -> ModelId {
        ModelId::new(requested.unwrap_or("none"))
    }

    async fn create_chat_completion(
        &self,
        _request: ChatCompletionRequest,
    ) -> Result<CompletionResult, ProviderError> {
        Err(ProviderError::NotConfigured(
            "generation is disabled".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
