//! Feature-shaped outputs produced by the consumer adapters.

use serde::{Deserialize, Serialize};

/// Field id used for suggestions that are not tied to a specific form field.
pub const GENERAL_FIELD_ID: &str = "general";

/// Severity of a suggestion. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Info,
    Warning,
    Error,
}

impl Importance {
    /// The highest severity a suggestion can carry.
    pub const fn highest() -> Self {
        Importance::Error
    }
}

/// One review comment on a submitted form answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSuggestion {
    pub field_id: String,
    pub importance: Importance,
    pub message: String,
}

impl FieldSuggestion {
    pub fn new(field_id: impl Into<String>, importance: Importance, message: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            importance,
            message: message.into(),
        }
    }

    /// A suggestion about the form as a whole.
    pub fn general(importance: Importance, message: impl Into<String>) -> Self {
        Self::new(GENERAL_FIELD_ID, importance, message)
    }

    pub fn is_general(&self) -> bool {
        self.field_id == GENERAL_FIELD_ID
    }
}

/// A legal term found in document text, with a plain-language explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalTerm {
    pub term: String,
    pub explanation: String,
}

/// Result of legal-term detection.
///
/// `notice` is set whenever detection could not complete normally; the
/// term list is then empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegalTermReport {
    pub terms: Vec<LegalTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<FieldSuggestion>,
}

impl LegalTermReport {
    pub fn found(terms: Vec<LegalTerm>) -> Self {
        Self { terms, notice: None }
    }

    pub fn degraded(notice: FieldSuggestion) -> Self {
        Self {
            terms: Vec::new(),
            notice: Some(notice),
        }
    }
}
