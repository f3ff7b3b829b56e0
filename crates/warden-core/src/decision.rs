//! Guardrail decisions.
//!
//! A [`Decision`] is the verdict of one guardrail check. Decisions are
//! immutable value types: the evaluator produces them, the orchestrator
//! reads them and discards them at the end of the request.
//!
//! ## Invariant
//!
//! `allowed == false` whenever `verdict != Verdict::Allow`. The
//! constructors on [`Decision`] uphold it, and [`Decision::normalized`]
//! repairs decisions deserialized from an evaluator that did not.
//! The converse (`verdict == Allow` implies `allowed`) is evaluator
//! policy and is deliberately left alone.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The evaluator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Generation may proceed.
    Allow,
    /// Generation must stop.
    Block,
    /// Needs a human; treated as a hard stop by the gateway.
    Review,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Block => "block",
            Verdict::Review => "review",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evaluator mechanism produced a decision.
///
/// The set is open-ended: evaluators may report their own tags through
/// [`DecisionStage::Other`]. Serialized as a plain snake_case string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum DecisionStage {
    Heuristic,
    PromptGuard,
    ModelBased,
    Other(String),
}

impl DecisionStage {
    pub fn as_str(&self) -> &str {
        match self {
            DecisionStage::Heuristic => "heuristic",
            DecisionStage::PromptGuard => "prompt_guard",
            DecisionStage::ModelBased => "model_based",
            DecisionStage::Other(tag) => tag,
        }
    }
}

impl From<String> for DecisionStage {
    fn from(value: String) -> Self {
        match value.as_str() {
            "heuristic" => DecisionStage::Heuristic,
            "prompt_guard" => DecisionStage::PromptGuard,
            "model_based" => DecisionStage::ModelBased,
            _ => DecisionStage::Other(value),
        }
    }
}

impl From<DecisionStage> for String {
    fn from(value: DecisionStage) -> Self {
        match value {
            DecisionStage::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for DecisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline checkpoint at which a guardrail check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailStage {
    /// Before generation, over the caller's prompt.
    Prompt,
    /// After generation, over the trimmed model output.
    Response,
}

impl GuardrailStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailStage::Prompt => "prompt",
            GuardrailStage::Response => "response",
        }
    }
}

impl fmt::Display for GuardrailStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque audit record attached to a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// When the event was recorded
    pub at: DateTime<Utc>,

    /// Short machine-readable kind (e.g. "detector_hit")
    pub kind: String,

    /// Free-form payload; never contains prompt or response text
    #[serde(default)]
    pub detail: JsonValue,
}

impl DecisionEvent {
    /// Record an event now.
    pub fn now(kind: impl Into<String>, detail: JsonValue) -> Self {
        Self {
            at: Utc::now(),
            kind: kind.into(),
            detail,
        }
    }
}

/// Prefix of the reason carried by decisions synthesized from a pipeline failure.
pub const PIPELINE_FAILURE_PREFIX: &str = "Guardrail pipeline failure during";

/// Event kind recorded on decisions synthesized from a pipeline failure.
pub const PIPELINE_FAILURE_EVENT: &str = "pipeline_failure";

/// The evaluator's structured verdict for one guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the pipeline may continue
    pub allowed: bool,

    /// Closed verdict taxonomy
    pub verdict: Verdict,

    /// Evaluator mechanism that produced this decision
    pub stage: DecisionStage,

    /// Human-readable reason, shown to end users in degraded form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Route to human review, independent of `allowed`
    #[serde(default)]
    pub escalate: bool,

    /// Audit trail in chronological order
    #[serde(default)]
    pub events: Vec<DecisionEvent>,
}

impl Decision {
    /// An allowing decision with no reason.
    pub fn allow(stage: DecisionStage) -> Self {
        Self {
            allowed: true,
            verdict: Verdict::Allow,
            stage,
            reason: None,
            escalate: false,
            events: Vec::new(),
        }
    }

    /// A blocking decision.
    pub fn block(stage: DecisionStage, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            verdict: Verdict::Block,
            stage,
            reason: Some(reason.into()),
            escalate: false,
            events: Vec::new(),
        }
    }

    /// A decision that needs human review. The gateway treats it as a stop.
    pub fn review(stage: DecisionStage, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            verdict: Verdict::Review,
            stage,
            reason: Some(reason.into()),
            escalate: false,
            events: Vec::new(),
        }
    }

    /// Fail-safe decision used when a guardrail check could not complete.
    ///
    /// Always `review`, always escalated, attributed to the heuristic stage.
    pub fn pipeline_failure(stage: GuardrailStage, message: &str) -> Self {
        let reason = format!("{} {}: {}", PIPELINE_FAILURE_PREFIX, stage, message);
        Self::review(DecisionStage::Heuristic, reason)
            .with_escalation(true)
            .with_event(DecisionEvent::now(
                PIPELINE_FAILURE_EVENT,
                serde_json::json!({ "stage": stage.as_str() }),
            ))
    }

    /// Set the escalation flag.
    pub fn with_escalation(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }

    /// Append an audit event.
    pub fn with_event(mut self, event: DecisionEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Enforce `verdict != allow => !allowed`.
    pub fn normalized(mut self) -> Self {
        if self.verdict != Verdict::Allow {
            self.allowed = false;
        }
        self
    }

    /// Whether the decision satisfies the verdict/allowed invariant.
    pub fn is_consistent(&self) -> bool {
        self.verdict == Verdict::Allow || !self.allowed
    }

    /// Whether this decision was synthesized from a pipeline failure
    /// rather than produced by a genuine policy check.
    pub fn is_pipeline_failure(&self) -> bool {
        self.events.iter().any(|e| e.kind == PIPELINE_FAILURE_EVENT)
    }
}
