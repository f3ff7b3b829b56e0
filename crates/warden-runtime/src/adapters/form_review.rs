//! Form-answer review.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use warden_core::{validate_output, FieldSuggestion, Importance, Language, OutputSchema};

use super::{describe_violation, parse_json_list, run_guarded, AdapterParseError, FallbackAdapter, Guarded};
use crate::error::GuardrailViolation;
use crate::orchestrator::{GenerationOptions, GuardedGenerator};
use crate::prompts::{form_review_prompt, FORM_REVIEW_SYSTEM_PROMPT};

pub const FORM_REVIEW_CHANNEL: &str = "form_review";

const UNAVAILABLE_MESSAGE: &str =
    "AI review is currently unavailable. Please double-check your answers before continuing.";

/// A request to review the answers entered into one document form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormReviewRequest {
    pub document_type: String,
    #[serde(default)]
    pub schema: JsonValue,
    #[serde(default)]
    pub answers: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl FormReviewRequest {
    fn language(&self) -> Option<Language> {
        self.language.as_deref().and_then(|l| l.parse().ok())
    }
}

/// Reviews form answers through the gateway.
///
/// Always yields suggestions; every failure becomes a single `general`
/// suggestion.
#[derive(Debug, Clone)]
pub struct FormReviewAdapter {
    generator: Arc<GuardedGenerator>,
}

impl FormReviewAdapter {
    pub fn new(generator: Arc<GuardedGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &GuardedGenerator {
        &self.generator
    }

    /// Review `request`, telling parsed suggestions apart from fallbacks.
    pub async fn review_guarded(&self, request: &FormReviewRequest) -> Guarded<Vec<FieldSuggestion>> {
        let prompt = form_review_prompt(
            &request.document_type,
            &request.schema,
            &request.answers,
            request.language.as_deref(),
        );

        let options = GenerationOptions {
            language: request.language(),
            metadata: Some(
                [("documentType".to_string(), request.document_type.clone())]
                    .into_iter()
                    .collect(),
            ),
            ..GenerationOptions::default()
        }
        .system(FORM_REVIEW_SYSTEM_PROMPT)
        .channel(FORM_REVIEW_CHANNEL)
        .json();

        run_guarded(&self.generator, &prompt, options, self).await
    }

    pub async fn review(&self, request: &FormReviewRequest) -> Vec<FieldSuggestion> {
        self.review_guarded(request).await.into_inner()
    }
}

impl FallbackAdapter for FormReviewAdapter {
    type Output = Vec<FieldSuggestion>;

    fn channel(&self) -> &'static str {
        FORM_REVIEW_CHANNEL
    }

    fn unavailable(&self) -> Vec<FieldSuggestion> {
        vec![FieldSuggestion::general(Importance::Warning, UNAVAILABLE_MESSAGE)]
    }

    fn blocked(&self, violation: &GuardrailViolation) -> Vec<FieldSuggestion> {
        vec![FieldSuggestion::general(
            Importance::highest(),
            describe_violation(violation, "Review"),
        )]
    }

    fn unexpected(&self, message: &str) -> Vec<FieldSuggestion> {
        vec![FieldSuggestion::general(
            Importance::Error,
            format!("Review failed unexpectedly: {}", message),
        )]
    }

    fn parse(&self, text: &str) -> Result<Vec<FieldSuggestion>, AdapterParseError> {
        let value = parse_json_list(text, "suggestions")?;
        validate_output(OutputSchema::FieldSuggestions, &value)?;
        serde_json::from_value(value).map_err(|e| AdapterParseError::UnexpectedShape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluatorError, HeuristicEvaluator};
    use crate::testing::{EvaluatorStep, ScriptedBackend, ScriptedEvaluator};
    use warden_core::{Decision, DecisionStage, Verdict, GENERAL_FIELD_ID};

    fn request() -> FormReviewRequest {
        serde_json::from_value(serde_json::json!({
            "documentType": "residential-lease",
            "schema": { "fields": [ { "id": "rent", "label": "Monthly rent" } ] },
            "answers": { "rent": "" },
            "language": "en"
        }))
        .unwrap()
    }

    fn adapter(evaluator: Arc<ScriptedEvaluator>, backend: Arc<ScriptedBackend>) -> FormReviewAdapter {
        let generator = GuardedGenerator::builder()
            .evaluator(evaluator)
            .backend(backend)
            .build()
            .unwrap();
        FormReviewAdapter::new(Arc::new(generator))
    }

    #[tokio::test]
    async fn test_parses_suggestions() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying(
            r#"{"suggestions": [{"fieldId": "rent", "importance": "error", "message": "Rent is empty."}]}"#,
        ));
        let adapter = adapter(evaluator.clone(), backend.clone());

        let outcome = adapter.review_guarded(&request()).await;
        assert!(!outcome.is_fallback());
        assert_eq!(
            outcome.into_inner(),
            vec![FieldSuggestion::new("rent", Importance::Error, "Rent is empty.")]
        );

        let requests = backend.requests();
        let sent = &requests[0];
        assert_eq!(sent.response_format, crate::providers::ResponseFormat::Json);
        assert_eq!(sent.messages[0].content, FORM_REVIEW_SYSTEM_PROMPT);
        assert!(evaluator.calls().iter().all(|c| c.channel == FORM_REVIEW_CHANNEL));
    }

    #[tokio::test]
    async fn test_accepts_bare_array_in_fence() {
        let backend = Arc::new(ScriptedBackend::replying(
            "```json\n[{\"fieldId\": \"general\", \"importance\": \"info\", \"message\": \"Looks complete.\"}]\n```",
        ));
        let suggestions = adapter(Arc::new(ScriptedEvaluator::allow_all()), backend)
            .review(&request())
            .await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].importance, Importance::Info);
    }

    #[tokio::test]
    async fn test_prompt_block_becomes_general_error() {
        let decision = Decision {
            allowed: false,
            verdict: Verdict::Block,
            stage: DecisionStage::PromptGuard,
            reason: Some("Sensitive personal data detected".to_string()),
            escalate: true,
            events: Vec::new(),
        };
        let evaluator = Arc::new(ScriptedEvaluator::new([EvaluatorStep::Decide(decision)]));
        let backend = Arc::new(ScriptedBackend::replying("[]"));

        let suggestions = adapter(evaluator, backend.clone()).review(&request()).await;

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].field_id, GENERAL_FIELD_ID);
        assert_eq!(suggestions[0].importance, Importance::Error);
        assert!(suggestions[0].message.contains("Sensitive personal data detected"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_response_block_becomes_general_error() {
        let evaluator = Arc::new(ScriptedEvaluator::new([
            EvaluatorStep::Decide(Decision::allow(DecisionStage::PromptGuard)),
            EvaluatorStep::Decide(Decision::block(DecisionStage::ModelBased, "Unsupported legal advice")),
        ]));
        let backend = Arc::new(ScriptedBackend::replying(
            r#"[{"fieldId": "rent", "importance": "info", "message": "You will win in court."}]"#,
        ));

        let outcome = adapter(evaluator, backend.clone()).review_guarded(&request()).await;
        assert!(outcome.is_fallback());

        let suggestions = outcome.into_inner();
        assert_eq!(
            suggestions,
            vec![FieldSuggestion::general(
                Importance::Error,
                "Review blocked by safety policy: Unsupported legal advice"
            )]
        );
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_response_stage_failure_becomes_general_error() {
        let evaluator = Arc::new(ScriptedEvaluator::new([
            EvaluatorStep::Decide(Decision::allow(DecisionStage::PromptGuard)),
            EvaluatorStep::Fail(EvaluatorError::Unavailable("down".to_string())),
        ]));
        let backend = Arc::new(ScriptedBackend::replying("[]"));

        let suggestions = adapter(evaluator, backend).review(&request()).await;

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].field_id, GENERAL_FIELD_ID);
        assert_eq!(suggestions[0].importance, Importance::Error);
        assert!(suggestions[0]
            .message
            .starts_with("Review could not be completed safely: Guardrail pipeline failure during response"));
    }

    #[tokio::test]
    async fn test_pipeline_failure_differs_only_in_wording() {
        let block = Decision::block(DecisionStage::PromptGuard, "Sensitive personal data detected");
        let blocked = adapter(
            Arc::new(ScriptedEvaluator::new([EvaluatorStep::Decide(block)])),
            Arc::new(ScriptedBackend::replying("[]")),
        )
        .review(&request())
        .await;

        let failed = adapter(
            Arc::new(ScriptedEvaluator::new([EvaluatorStep::Fail(EvaluatorError::Unavailable(
                "network error".to_string(),
            ))])),
            Arc::new(ScriptedBackend::replying("[]")),
        )
        .review(&request())
        .await;

        assert_eq!(blocked.len(), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(blocked[0].field_id, failed[0].field_id);
        assert_eq!(blocked[0].importance, failed[0].importance);
        assert!(blocked[0].message.starts_with("Review blocked by safety policy"));
        assert!(failed[0].message.starts_with("Review could not be completed safely"));
        assert_ne!(blocked[0].message, failed[0].message);
    }

    #[tokio::test]
    async fn test_unconfigured_is_warning() {
        let suggestions = adapter(
            Arc::new(ScriptedEvaluator::allow_all()),
            Arc::new(ScriptedBackend::unconfigured()),
        )
        .review(&request())
        .await;

        assert_eq!(suggestions, vec![FieldSuggestion::general(Importance::Warning, UNAVAILABLE_MESSAGE)]);
    }

    #[tokio::test]
    async fn test_schema_violation_is_unexpected() {
        let backend = Arc::new(ScriptedBackend::replying(
            r#"[{"fieldId": "rent", "importance": "critical", "message": "?"}]"#,
        ));
        let outcome = adapter(Arc::new(ScriptedEvaluator::allow_all()), backend)
            .review_guarded(&request())
            .await;

        assert!(outcome.is_fallback());
        let suggestions = outcome.into_inner();
        assert_eq!(suggestions[0].importance, Importance::Error);
        assert!(suggestions[0].message.starts_with("Review failed unexpectedly"));
    }

    #[tokio::test]
    async fn test_heuristic_blocks_ssn_in_answers() {
        let generator = GuardedGenerator::builder()
            .evaluator(Arc::new(HeuristicEvaluator::default()))
            .backend(Arc::new(ScriptedBackend::replying("[]")))
            .build()
            .unwrap();
        let adapter = FormReviewAdapter::new(Arc::new(generator));

        let mut request = request();
        request.answers = serde_json::json!({ "tenantSsn": "123-45-6789" });

        let suggestions = adapter.review(&request).await;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(
            suggestions[0].message,
            "Review blocked by safety policy: Sensitive personal data detected"
        );
    }
}
