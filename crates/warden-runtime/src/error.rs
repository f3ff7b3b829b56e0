//! Errors surfaced by the guarded generation gateway.

use std::error::Error as StdError;

use thiserror::Error;

use warden_core::{Decision, GuardrailStage};

use crate::providers::ProviderError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A guardrail stopped the request.
///
/// Covers both genuine policy blocks and fail-safe stops synthesized when
/// the evaluator could not complete. For the latter, [`source`] returns the
/// evaluator error.
///
/// [`source`]: std::error::Error::source
#[derive(Error, Debug)]
#[error("{message}")]
pub struct GuardrailViolation {
    decision: Decision,
    stage: GuardrailStage,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl GuardrailViolation {
    /// A genuine block: the evaluator returned a non-allowing decision.
    pub fn blocked(stage: GuardrailStage, decision: Decision) -> Self {
        let reason = decision.reason.as_deref().unwrap_or("policy violation");
        let message = format!("Guardrail blocked {}: {}", stage, reason);
        Self {
            decision,
            stage,
            message,
            cause: None,
        }
    }

    /// A fail-safe stop: the evaluator errored, timed out or was cancelled.
    pub fn pipeline_failure(stage: GuardrailStage, cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        let decision = Decision::pipeline_failure(stage, &cause.to_string());
        let message = decision.reason.clone().unwrap_or_default();
        Self {
            decision,
            stage,
            message,
            cause: Some(cause),
        }
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    pub fn stage(&self) -> GuardrailStage {
        self.stage
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The decision's reason, when one was given.
    pub fn reason(&self) -> Option<&str> {
        self.decision.reason.as_deref()
    }

    pub fn is_pipeline_failure(&self) -> bool {
        self.cause.is_some()
    }
}

/// Errors from [`GuardedGenerator::generate_guarded_text`].
///
/// [`GuardedGenerator::generate_guarded_text`]: crate::GuardedGenerator::generate_guarded_text
#[derive(Error, Debug)]
pub enum GuardedGenerationError {
    /// The request was rejected before any guardrail or backend call.
    #[error("{0}")]
    Validation(String),

    /// No usable backend.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Guardrail(#[from] GuardrailViolation),

    /// The backend failed or returned nothing usable.
    #[error("{message}")]
    Gateway {
        message: String,
        #[source]
        source: Option<ProviderError>,
    },
}

impl GuardedGenerationError {
    pub(crate) fn gateway(source: ProviderError) -> Self {
        Self::Gateway {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn empty_content() -> Self {
        Self::Gateway {
            message: "gateway returned empty content".to_string(),
            source: None,
        }
    }

    pub fn as_violation(&self) -> Option<&GuardrailViolation> {
        match self {
            Self::Guardrail(violation) => Some(violation),
            _ => None,
        }
    }
}
