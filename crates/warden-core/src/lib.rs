//! # warden-core
//!
//! Decision model and deterministic policy for the Warden generation gateway.
//!
//! This crate answers, for one guardrail checkpoint:
//! - What context is being screened? ([`GuardrailInput`])
//! - What did the policy decide? ([`Decision`])
//! - What does a feature show the user? ([`FieldSuggestion`], [`LegalTermReport`])
//!
//! ## Key Guarantees
//!
//! 1. **No I/O on the hot path**: evaluation is pure, rule-based code
//! 2. **No LLM calls**: generation lives in `warden-runtime`
//! 3. **Closed taxonomy**: verdicts and stages are enums, not strings
//! 4. **No content in audit events**: detectors record spans, never text
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::{GuardrailInput, HeuristicPolicy, Verdict};
//!
//! let input = GuardrailInput::builder("My SSN is 123-45-6789")
//!     .channel("form_review")
//!     .build()?;
//! let decision = HeuristicPolicy::default().evaluate(&input, None);
//!
//! match decision.verdict {
//!     Verdict::Allow => println!("OK"),
//!     Verdict::Block | Verdict::Review => println!("STOP: {:?}", decision.reason),
//! }
//! ```

pub mod decision;
pub mod input;
pub mod policy;
pub mod schema;
pub mod suggestion;

pub use decision::{
    Decision, DecisionEvent, DecisionStage, GuardrailStage, Verdict, PIPELINE_FAILURE_EVENT,
    PIPELINE_FAILURE_PREFIX,
};
pub use input::{GuardrailInput, GuardrailInputBuilder, InputError, Language, DEFAULT_CHANNEL};
pub use policy::{Detector, HeuristicPolicy, PolicyError, PolicyPack};
pub use schema::{validate_output, OutputSchema, SchemaError};
pub use suggestion::{FieldSuggestion, Importance, LegalTerm, LegalTermReport, GENERAL_FIELD_ID};
