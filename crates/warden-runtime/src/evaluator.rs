//! Policy evaluator contract and the built-in heuristic evaluator.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{Decision, GuardrailInput, HeuristicPolicy, PolicyPack};

/// Errors from policy evaluators.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Evaluator unavailable: {0}")]
    Unavailable(String),

    #[error("Evaluator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Internal evaluator error: {0}")]
    Internal(String),
}

/// Judges a request, and optionally the text generated for it.
///
/// # Call Contract
/// - Called at most twice per request, with the same `input` both times
/// - `generated_text` is `None` at the prompt stage and the trimmed
///   backend output at the response stage
/// - Failure is allowed; the gateway turns it into a fail-safe stop
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        input: &GuardrailInput,
        generated_text: Option<&str>,
    ) -> Result<Decision, EvaluatorError>;

    /// Evaluator name for logs and health output.
    fn name(&self) -> &str;
}

/// Deterministic evaluator backed by a [`PolicyPack`].
#[derive(Debug, Clone, Default)]
pub struct HeuristicEvaluator {
    policy: HeuristicPolicy,
}

impl HeuristicEvaluator {
    pub fn new(pack: PolicyPack) -> Self {
        Self {
            policy: HeuristicPolicy::new(pack),
        }
    }

    pub fn policy(&self) -> &HeuristicPolicy {
        &self.policy
    }
}

#[async_trait]
impl PolicyEvaluator for HeuristicEvaluator {
    async fn evaluate(
        &self,
        input: &GuardrailInput,
        generated_text: Option<&str>,
    ) -> Result<Decision, EvaluatorError> {
        Ok(self.policy.evaluate(input, generated_text))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
