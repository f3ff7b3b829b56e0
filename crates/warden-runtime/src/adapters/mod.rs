//! Consumer adapters.
//!
//! An adapter turns the gateway's typed outcome into a feature-shaped
//! value the caller can always render:
//!
//! | Outcome | Result |
//! |---|---|
//! | `Configuration` error | [`FallbackAdapter::unavailable`] |
//! | `Guardrail` violation | [`FallbackAdapter::blocked`] |
//! | any other error | [`FallbackAdapter::unexpected`] |
//! | text | [`FallbackAdapter::parse`], or `unexpected` if parsing fails |
//!
//! Adapters never retry and never call an evaluator themselves.

use serde_json::Value as JsonValue;
use thiserror::Error;

use warden_core::SchemaError;

use crate::error::{GuardedGenerationError, GuardrailViolation};
use crate::orchestrator::{GenerationOptions, GuardedGenerator};

pub mod form_review;
pub mod legal_terms;

pub use form_review::{FormReviewAdapter, FormReviewRequest, FORM_REVIEW_CHANNEL};
pub use legal_terms::{LegalTermAdapter, LEGAL_TERMS_CHANNEL};

/// Errors turning model text into adapter output.
#[derive(Error, Debug)]
pub enum AdapterParseError {
    #[error("Model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Model output has an unexpected shape: {0}")]
    UnexpectedShape(String),
}

/// Feature-specific fallbacks for every non-success outcome.
pub trait FallbackAdapter: Send + Sync {
    type Output: Send;

    /// Channel tag sent with every request from this adapter.
    fn channel(&self) -> &'static str;

    /// The gateway has no configured backend.
    fn unavailable(&self) -> Self::Output;

    /// A guardrail stopped the request.
    fn blocked(&self, violation: &GuardrailViolation) -> Self::Output;

    /// Anything else went wrong.
    fn unexpected(&self, message: &str) -> Self::Output;

    fn parse(&self, text: &str) -> Result<Self::Output, AdapterParseError>;
}

/// Adapter output, tagged with whether it is a fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<O> {
    Parsed(O),
    Fallback(O),
}

impl<O> Guarded<O> {
    pub fn into_inner(self) -> O {
        match self {
            Guarded::Parsed(output) | Guarded::Fallback(output) => output,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Guarded::Fallback(_))
    }
}

/// Run one guarded generation and map the outcome through `adapter`.
///
/// The adapter's channel is used unless `options` already names one.
pub async fn run_guarded<A: FallbackAdapter>(
    generator: &GuardedGenerator,
    prompt: &str,
    mut options: GenerationOptions,
    adapter: &A,
) -> Guarded<A::Output> {
    if options.channel.is_none() {
        options.channel = Some(adapter.channel().to_string());
    }

    match generator.generate_guarded_text(prompt, options).await {
        Ok(text) => match adapter.parse(&text) {
            Ok(output) => Guarded::Parsed(output),
            Err(err) => {
                tracing::warn!(channel = adapter.channel(), error = %err, "Discarding unparseable model output");
                Guarded::Fallback(adapter.unexpected(&err.to_string()))
            }
        },
        Err(GuardedGenerationError::Configuration(_)) => Guarded::Fallback(adapter.unavailable()),
        Err(GuardedGenerationError::Guardrail(violation)) => {
            Guarded::Fallback(adapter.blocked(&violation))
        }
        Err(err) => {
            tracing::warn!(channel = adapter.channel(), error = %err, "Guarded generation failed");
            Guarded::Fallback(adapter.unexpected(&err.to_string()))
        }
    }
}

/// User-facing wording for a violation.
///
/// Pipeline failures and genuine blocks are the same error type; only the
/// wording tells them apart.
pub fn describe_violation(violation: &GuardrailViolation, subject: &str) -> String {
    let reason = violation.reason().unwrap_or("policy violation");
    if violation.is_pipeline_failure() {
        format!("{} could not be completed safely: {}", subject, reason)
    } else {
        format!("{} blocked by safety policy: {}", subject, reason)
    }
}

/// Drop a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse model JSON, accepting either a bare array or `{ "<key>": [...] }`.
pub(crate) fn parse_json_list(text: &str, key: &str) -> Result<JsonValue, AdapterParseError> {
    let value: JsonValue = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AdapterParseError::InvalidJson(e.to_string()))?;

    match value {
        JsonValue::Array(_) => Ok(value),
        JsonValue::Object(mut map) => match map.remove(key) {
            Some(list @ JsonValue::Array(_)) => Ok(list),
            _ => Err(AdapterParseError::UnexpectedShape(format!(
                "expected an array or an object with a '{}' array",
                key
            ))),
        },
        other => Err(AdapterParseError::UnexpectedShape(format!(
            "expected an array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
