//! Legal-term detection.

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_core::{
    validate_output, FieldSuggestion, Importance, Language, LegalTerm, LegalTermReport, OutputSchema,
};

use super::{describe_violation, parse_json_list, run_guarded, AdapterParseError, FallbackAdapter, Guarded};
use crate::error::GuardrailViolation;
use crate::orchestrator::{GenerationOptions, GuardedGenerator};
use crate::prompts::{legal_terms_prompt, LEGAL_TERMS_SYSTEM_PROMPT};

pub const LEGAL_TERMS_CHANNEL: &str = "legal_terms";

/// Finds legal terms in document text and explains them.
#[derive(Debug, Clone)]
pub struct LegalTermAdapter {
    generator: Arc<GuardedGenerator>,
}

impl LegalTermAdapter {
    pub fn new(generator: Arc<GuardedGenerator>) -> Self {
        Self { generator }
    }

    /// Detect terms in `document_text`. Blank text yields an empty report
    /// without calling the gateway.
    pub async fn detect_guarded(
        &self,
        document_text: &str,
        language: Option<Language>,
    ) -> Guarded<LegalTermReport> {
        if document_text.trim().is_empty() {
            return Guarded::Parsed(LegalTermReport::default());
        }

        let prompt = legal_terms_prompt(document_text, language.map(|l| l.as_str()));
        let options = GenerationOptions {
            language,
            ..GenerationOptions::default()
        }
        .system(LEGAL_TERMS_SYSTEM_PROMPT)
        .channel(LEGAL_TERMS_CHANNEL)
        .json();

        run_guarded(&self.generator, &prompt, options, self).await
    }

    pub async fn detect(&self, document_text: &str, language: Option<Language>) -> LegalTermReport {
        self.detect_guarded(document_text, language).await.into_inner()
    }
}

impl FallbackAdapter for LegalTermAdapter {
    type Output = LegalTermReport;

    fn channel(&self) -> &'static str {
        LEGAL_TERMS_CHANNEL
    }

    fn unavailable(&self) -> LegalTermReport {
        LegalTermReport::degraded(FieldSuggestion::general(
            Importance::Warning,
            "Legal term explanations are currently unavailable.",
        ))
    }

    fn blocked(&self, violation: &GuardrailViolation) -> LegalTermReport {
        LegalTermReport::degraded(FieldSuggestion::general(
            Importance::highest(),
            describe_violation(violation, "Legal term detection"),
        ))
    }

    fn unexpected(&self, message: &str) -> LegalTermReport {
        LegalTermReport::degraded(FieldSuggestion::general(
            Importance::Error,
            format!("Legal term detection failed unexpectedly: {}", message),
        ))
    }

    fn parse(&self, text: &str) -> Result<LegalTermReport, AdapterParseError> {
        let value = parse_json_list(text, "terms")?;
        validate_output(OutputSchema::LegalTerms, &value)?;
        let terms: Vec<LegalTerm> =
            serde_json::from_value(value).map_err(|e| AdapterParseError::UnexpectedShape(e.to_string()))?;

        // First occurrence wins; comparison ignores case and surrounding space.
        let mut seen = BTreeSet::new();
        let terms = terms
            .into_iter()
            .map(|t| LegalTerm {
                term: t.term.trim().to_string(),
                explanation: t.explanation.trim().to_string(),
            })
            .filter(|t| !t.term.is_empty() && seen.insert(t.term.to_lowercase()))
            .collect();

        Ok(LegalTermReport::found(terms))
    }
}
