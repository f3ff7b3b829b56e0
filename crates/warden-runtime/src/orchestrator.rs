//! The guarded generation gateway.
//!
//! Every generation goes through [`GuardedGenerator::generate_guarded_text`]:
//!
//! ```text
//! preconditions → prompt screening → one backend call → trim → response screening → text
//! ```
//!
//! Any stop at a screening stage surfaces as a [`GuardrailViolation`],
//! whether the evaluator blocked or could not complete. Backend trouble
//! surfaces as [`GuardedGenerationError::Gateway`]. Nothing is retried.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use warden_core::{
    Decision, GuardrailInput, GuardrailStage, InputError, Language, DEFAULT_CHANNEL,
};

use crate::cancel::CancellationSignal;
use crate::config::{ConfigError, RuntimeConfig, DEFAULT_SYSTEM_PROMPT};
use crate::error::{GuardedGenerationError, GuardrailViolation};
use crate::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::providers::{
    ChatCompletionRequest, ChatMessage, GenerationBackend, ProviderError, ResponseFormat,
};

/// Per-request options. Everything except the guardrail context fields is
/// passed through to the backend untouched.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// System message; the configured default is used when absent.
    pub system: Option<String>,
    pub model: Option<String>,
    pub channel: Option<String>,
    pub language: Option<Language>,
    pub jurisdiction: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
    pub context: Option<Vec<String>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: ResponseFormat,
    /// Time budget for the whole request, shared by all three calls.
    pub deadline: Option<Duration>,
    pub cancellation: Option<CancellationSignal>,
}

impl GenerationOptions {
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }
}

/// Defaults applied when a request leaves a field unset.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub model: Option<String>,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: None,
            max_tokens: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RuntimeConfig> for GenerationDefaults {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            system_prompt: config.default_system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout: config.request_timeout,
        }
    }
}

/// How a bounded call ended.
enum Bounded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Race `call` against the request deadline and cancellation.
///
/// Cancellation is polled first, so an already-cancelled request never
/// starts the call.
async fn bounded<F: Future>(
    call: F,
    deadline: Option<Instant>,
    cancellation: Option<&CancellationSignal>,
) -> Bounded<F::Output> {
    let cancelled = async {
        match cancellation {
            Some(signal) => signal.cancelled().await,
            None => futures::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancelled => Bounded::Cancelled,
        outcome = within(deadline, call) => match outcome {
            Some(value) => Bounded::Done(value),
            None => Bounded::TimedOut,
        },
    }
}

/// `None` deadline means the budget is too large to represent; run unbounded.
async fn within<F: Future>(deadline: Option<Instant>, call: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call).await.ok(),
        None => Some(call.await),
    }
}

/// Request-scoped state shared by the stages.
struct RequestScope<'a> {
    input: GuardrailInput,
    deadline: Option<Instant>,
    budget: Duration,
    cancellation: Option<&'a CancellationSignal>,
}

/// Sequences evaluator → backend → evaluator for one request.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct GuardedGenerator {
    evaluator: Arc<dyn PolicyEvaluator>,
    backend: Arc<dyn GenerationBackend>,
    defaults: GenerationDefaults,
}

impl std::fmt::Debug for GuardedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedGenerator")
            .field("evaluator", &self.evaluator.name())
            .field("backend", &self.backend.name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl GuardedGenerator {
    pub fn new(
        evaluator: Arc<dyn PolicyEvaluator>,
        backend: Arc<dyn GenerationBackend>,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            evaluator,
            backend,
            defaults,
        }
    }

    pub fn builder() -> GuardedGeneratorBuilder {
        GuardedGeneratorBuilder::new()
    }

    /// Whether the backend can serve requests.
    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn evaluator_name(&self) -> &str {
        self.evaluator.name()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Generate text for `prompt`, screened before and after generation.
    ///
    /// # Errors
    /// - `Validation` if the prompt is blank
    /// - `Configuration` if the backend is not configured; no evaluator call is made
    /// - `Guardrail` if either screening stage stops the request
    /// - `Gateway` if the backend fails, times out, is cancelled or returns blank text
    pub async fn generate_guarded_text(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GuardedGenerationError> {
        if prompt.trim().is_empty() {
            return Err(GuardedGenerationError::Validation(
                InputError::EmptyPrompt.to_string(),
            ));
        }

        if !self.backend.is_configured() {
            return Err(GuardedGenerationError::Configuration(
                "AI gateway is not configured".to_string(),
            ));
        }

        let input = GuardrailInput::builder(prompt)
            .channel(options.channel.as_deref().unwrap_or(DEFAULT_CHANNEL))
            .language(options.language)
            .jurisdiction(options.jurisdiction.clone())
            .context(options.context.clone())
            .metadata(options.metadata.clone())
            .build()
            .map_err(|e| GuardedGenerationError::Validation(e.to_string()))?;

        let budget = options.deadline.unwrap_or(self.defaults.request_timeout);
        let span = tracing::info_span!(
            "guarded_generation",
            channel = input.channel(),
            backend = self.backend.name(),
            evaluator = self.evaluator.name(),
        );

        let scope = RequestScope {
            input,
            deadline: Instant::now().checked_add(budget),
            budget,
            cancellation: options.cancellation.as_ref(),
        };

        self.run(&scope, prompt, &options).instrument(span).await
    }

    async fn run(
        &self,
        scope: &RequestScope<'_>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GuardedGenerationError> {
        self.screen(scope, GuardrailStage::Prompt, None).await?;

        let text = self.generate(scope, prompt, options).await?;

        self.screen(scope, GuardrailStage::Response, Some(&text)).await?;

        tracing::info!("Guarded generation completed");
        Ok(text)
    }

    /// Run one screening stage. Exactly one evaluator call.
    async fn screen(
        &self,
        scope: &RequestScope<'_>,
        stage: GuardrailStage,
        generated_text: Option<&str>,
    ) -> Result<Decision, GuardrailViolation> {
        let outcome = bounded(
            self.evaluator.evaluate(&scope.input, generated_text),
            scope.deadline,
            scope.cancellation,
        )
        .await;

        let failure = match outcome {
            Bounded::Done(Ok(decision)) => return Self::judge(stage, decision.normalized()),
            Bounded::Done(Err(err)) => err,
            Bounded::TimedOut => EvaluatorError::Timeout(scope.budget),
            Bounded::Cancelled => EvaluatorError::Cancelled,
        };

        tracing::warn!(
            stage = stage.as_str(),
            error = %failure,
            escalate = true,
            "Guardrail pipeline failure, stopping request"
        );
        Err(GuardrailViolation::pipeline_failure(stage, failure))
    }

    fn judge(stage: GuardrailStage, decision: Decision) -> Result<Decision, GuardrailViolation> {
        if decision.escalate {
            tracing::warn!(
                stage = stage.as_str(),
                verdict = decision.verdict.as_str(),
                decision_stage = decision.stage.as_str(),
                escalate = true,
                "Guardrail decision escalated"
            );
        } else {
            tracing::debug!(
                stage = stage.as_str(),
                verdict = decision.verdict.as_str(),
                decision_stage = decision.stage.as_str(),
                "Guardrail decision"
            );
        }

        if decision.allowed {
            Ok(decision)
        } else {
            Err(GuardrailViolation::blocked(stage, decision))
        }
    }

    /// The single backend call. Returns trimmed, non-empty text.
    async fn generate(
        &self,
        scope: &RequestScope<'_>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GuardedGenerationError> {
        let requested = options.model.as_deref().or(self.defaults.model.as_deref());
        let model = self.backend.resolve_model(requested);

        let system = options
            .system
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(self.defaults.system_prompt.as_str());

        let request = ChatCompletionRequest {
            model: model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(prompt)],
            temperature: options.temperature.or(self.defaults.temperature),
            max_tokens: options.max_tokens.or(self.defaults.max_tokens),
            response_format: options.response_format,
        };

        tracing::debug!(model = %model, "Calling generation backend");

        let result = match bounded(
            self.backend.create_chat_completion(request),
            scope.deadline,
            scope.cancellation,
        )
        .await
        {
            Bounded::Done(Ok(result)) => result,
            Bounded::Done(Err(err)) => {
                tracing::warn!(model = %model, error = %err, "Generation backend failed");
                return Err(GuardedGenerationError::gateway(err));
            }
            Bounded::TimedOut => {
                tracing::warn!(model = %model, budget = ?scope.budget, "Generation backend timed out");
                return Err(GuardedGenerationError::gateway(ProviderError::Timeout(
                    scope.budget,
                )));
            }
            Bounded::Cancelled => {
                tracing::info!(model = %model, "Generation cancelled");
                return Err(GuardedGenerationError::gateway(ProviderError::Cancelled));
            }
        };

        self.backend
            .extract_message_content(&result)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(GuardedGenerationError::empty_content)
    }
}

/// Builder for [`GuardedGenerator`].
pub struct GuardedGeneratorBuilder {
    evaluator: Option<Arc<dyn PolicyEvaluator>>,
    backend: Option<Arc<dyn GenerationBackend>>,
    defaults: GenerationDefaults,
}

impl GuardedGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            evaluator: None,
            backend: None,
            defaults: GenerationDefaults::default(),
        }
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build the generator. Both an evaluator and a backend are required.
    pub fn build(self) -> Result<GuardedGenerator, ConfigError> {
        let evaluator = self.evaluator.ok_or_else(|| ConfigError::MissingComponent {
            component: "guarded generator".to_string(),
            message: "no policy evaluator set".to_string(),
        })?;
        let backend = self.backend.ok_or_else(|| ConfigError::MissingComponent {
            component: "guarded generator".to_string(),
            message: "no generation backend set".to_string(),
        })?;

        Ok(GuardedGenerator::new(evaluator, backend, self.defaults))
    }
}

impl Default for GuardedGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationHandle;
    use crate::providers::{CompletionResult, ChatRole};
    use crate::testing::{BackendStep, EvaluatorStep, ScriptedBackend, ScriptedEvaluator};
    use proptest::prelude::*;
    use std::error::Error as _;
    use warden_core::{DecisionStage, Verdict};

    fn generator(
        evaluator: &Arc<ScriptedEvaluator>,
        backend: &Arc<ScriptedBackend>,
    ) -> GuardedGenerator {
        GuardedGenerator::builder()
            .evaluator(evaluator.clone())
            .backend(backend.clone())
            .build()
            .unwrap()
    }

    fn allow() -> EvaluatorStep {
        EvaluatorStep::Decide(Decision::allow(DecisionStage::PromptGuard))
    }

    #[tokio::test]
    async fn test_happy_path_calls_each_collaborator_once() {
        let evaluator = Arc::new(ScriptedEvaluator::new([allow(), allow()]));
        let backend = Arc::new(ScriptedBackend::new([BackendStep::Raw(
            serde_json::from_value::<CompletionResult>(serde_json::json!({
                "choices": [ { "message": { "role": "assistant", "content": "result" } } ]
            }))
            .unwrap(),
        )]));

        let text = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "result");
        assert_eq!(evaluator.call_count(), 2);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_backend_skips_evaluator() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::unconfigured());

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GuardedGenerationError::Configuration(ref m) if m == "AI gateway is not configured"));
        assert_eq!(evaluator.call_count(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_validation_error() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::unconfigured());

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("   ", GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GuardedGenerationError::Validation(ref m) if m == "Prompt text is required"));
        assert_eq!(evaluator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_prompt_block_never_reaches_backend() {
        let block = Decision {
            allowed: false,
            verdict: Verdict::Block,
            stage: DecisionStage::PromptGuard,
            reason: Some("Sensitive personal data detected".to_string()),
            escalate: true,
            events: Vec::new(),
        };
        let evaluator = Arc::new(ScriptedEvaluator::new([EvaluatorStep::Decide(block.clone())]));
        let backend = Arc::new(ScriptedBackend::replying("should not be generated"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("my ssn is ...", GenerationOptions::default())
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert_eq!(violation.stage(), GuardrailStage::Prompt);
        assert_eq!(violation.decision(), &block);
        assert_eq!(
            violation.message(),
            "Guardrail blocked prompt: Sensitive personal data detected"
        );
        assert!(violation.source().is_none());
        assert_eq!(backend.call_count(), 0);
        assert_eq!(evaluator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_evaluator_error_is_fail_safe_violation() {
        let evaluator = Arc::new(ScriptedEvaluator::new([EvaluatorStep::Fail(
            EvaluatorError::Unavailable("connection reset".to_string()),
        )]));
        let backend = Arc::new(ScriptedBackend::replying("unused"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert_eq!(violation.decision().verdict, Verdict::Review);
        assert!(violation.decision().escalate);
        assert!(!violation.decision().allowed);
        assert_eq!(violation.decision().stage, DecisionStage::Heuristic);
        assert!(violation
            .reason()
            .unwrap()
            .starts_with("Guardrail pipeline failure during prompt: "));
        assert!(violation.source().unwrap().to_string().contains("connection reset"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_response_stage_sees_trimmed_text() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("  structured  "));

        let text = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "structured");
        let calls = evaluator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].generated_text, None);
        assert_eq!(calls[1].generated_text.as_deref(), Some("structured"));
        assert_eq!(calls[0].prompt, calls[1].prompt);
    }

    #[tokio::test]
    async fn test_response_block() {
        let evaluator = Arc::new(ScriptedEvaluator::new([
            allow(),
            EvaluatorStep::Decide(Decision::review(DecisionStage::ModelBased, "Promises an outcome")),
        ]));
        let backend = Arc::new(ScriptedBackend::replying("You will win."));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert_eq!(violation.stage(), GuardrailStage::Response);
        assert_eq!(violation.message(), "Guardrail blocked response: Promises an outcome");
    }

    #[tokio::test]
    async fn test_response_stage_failure_is_fail_safe_violation() {
        let evaluator = Arc::new(ScriptedEvaluator::new([
            allow(),
            EvaluatorStep::Fail(EvaluatorError::Unavailable("down".to_string())),
        ]));
        let backend = Arc::new(ScriptedBackend::replying("draft"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert_eq!(violation.stage(), GuardrailStage::Response);
        assert!(violation.is_pipeline_failure());
        assert!(violation.decision().escalate);
        assert_eq!(violation.decision().verdict, Verdict::Review);
        assert!(violation
            .reason()
            .unwrap()
            .starts_with("Guardrail pipeline failure during response: "));
        assert!(violation.source().unwrap().to_string().contains("down"));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(evaluator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_inconsistent_decision_is_normalized() {
        let mut sloppy = Decision::block(DecisionStage::Other("vendor_x".to_string()), "nope");
        sloppy.allowed = true;
        let evaluator = Arc::new(ScriptedEvaluator::new([EvaluatorStep::Decide(sloppy)]));
        let backend = Arc::new(ScriptedBackend::replying("unused"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert!(!violation.decision().allowed);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_backend_text_is_gateway_error() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("   \n "));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GuardedGenerationError::Gateway { ref message, source: None } if message == "gateway returned empty content"));
        assert_eq!(evaluator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_not_retried() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::new([BackendStep::Fail(
            ProviderError::RateLimited { retry_after: None },
        )]));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuardedGenerationError::Gateway { source: Some(ProviderError::RateLimited { .. }), .. }
        ));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(evaluator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("[]"));
        let generator = GuardedGenerator::builder()
            .evaluator(evaluator.clone())
            .backend(backend.clone())
            .defaults(GenerationDefaults {
                model: Some("house-model".to_string()),
                temperature: Some(0.1),
                ..GenerationDefaults::default()
            })
            .build()
            .unwrap();

        generator
            .generate_guarded_text(
                "review this",
                GenerationOptions {
                    max_tokens: Some(256),
                    ..GenerationOptions::default()
                }
                .system("Be terse.")
                .channel("form_review")
                .json(),
            )
            .await
            .unwrap();

        let requests = backend.requests();
        let request = &requests[0];
        assert_eq!(request.model.as_str(), "house-model");
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[0].content, "Be terse.");
        assert_eq!(request.messages[1].content, "review this");
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.response_format, ResponseFormat::Json);
        assert_eq!(evaluator.calls()[0].channel, "form_review");
    }

    #[tokio::test]
    async fn test_default_system_prompt() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("ok"));

        generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default().system("  "))
            .await
            .unwrap();

        assert_eq!(backend.requests()[0].messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(evaluator.calls()[0].channel, DEFAULT_CHANNEL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluator_deadline_is_fail_safe() {
        let evaluator = Arc::new(ScriptedEvaluator::new([EvaluatorStep::Hang]));
        let backend = Arc::new(ScriptedBackend::replying("unused"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text(
                "hello",
                GenerationOptions::default().deadline(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert!(violation.is_pipeline_failure());
        assert!(violation.decision().escalate);
        assert!(violation.reason().unwrap().contains("timed out"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_deadline_is_gateway_error() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::new([BackendStep::Delayed(
            Duration::from_secs(5),
            "late".to_string(),
        )]));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text(
                "hello",
                GenerationOptions::default().deadline(Duration::from_secs(1)),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuardedGenerationError::Gateway { source: Some(ProviderError::Timeout(_)), .. }
        ));
        assert_eq!(evaluator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_runs_unbounded() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("fine"));

        let text = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default().deadline(Duration::MAX))
            .await
            .unwrap();

        assert_eq!(text, "fine");
        assert_eq!(evaluator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_backend() {
        let (handle, signal) = CancellationHandle::new();
        handle.cancel();

        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying("unused"));

        let err = generator(&evaluator, &backend)
            .generate_guarded_text("hello", GenerationOptions::default().cancellation(signal))
            .await
            .unwrap_err();

        let violation = err.as_violation().unwrap();
        assert!(violation.is_pipeline_failure());
        assert!(violation.reason().unwrap().contains("cancelled"));
        assert_eq!(evaluator.call_count(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_backend() {
        let (handle, signal) = CancellationHandle::new();
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::new([BackendStep::Hang]));
        let generator = Arc::new(generator(&evaluator, &backend));

        let task = tokio::spawn({
            let generator = generator.clone();
            async move {
                generator
                    .generate_guarded_text("hello", GenerationOptions::default().cancellation(signal))
                    .await
            }
        });

        while backend.call_count() == 0 {
            tokio::task::yield_now().await;
        }
        handle.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            GuardedGenerationError::Gateway { source: Some(ProviderError::Cancelled), .. }
        ));
        assert_eq!(evaluator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let evaluator = Arc::new(ScriptedEvaluator::allow_all());
        let backend = Arc::new(ScriptedBackend::replying(" shared "));
        let generator = Arc::new(generator(&evaluator, &backend));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let generator = generator.clone();
                tokio::spawn(async move {
                    generator
                        .generate_guarded_text(&format!("prompt {}", i), GenerationOptions::default())
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(evaluator.call_count(), 16);
        assert_eq!(backend.call_count(), 8);
    }

    #[test]
    fn test_builder_requires_components() {
        let result = GuardedGenerator::builder()
            .evaluator(Arc::new(ScriptedEvaluator::allow_all()))
            .build();
        assert!(matches!(result, Err(ConfigError::MissingComponent { .. })));
    }

    proptest! {
        #[test]
        fn prop_returned_text_is_trimmed_and_screened(
            core in "[a-z]{1,12}( [a-z]{1,12}){0,3}",
            lead in "[ \t\n]{0,4}",
            tail in "[ \t\n]{0,4}",
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            let evaluator = Arc::new(ScriptedEvaluator::allow_all());
            let backend = Arc::new(ScriptedBackend::replying(format!("{}{}{}", lead, core, tail)));
            let generator = generator(&evaluator, &backend);

            let text = runtime
                .block_on(generator.generate_guarded_text("hello", GenerationOptions::default()))
                .unwrap();

            prop_assert_eq!(&text, &core);
            let calls = evaluator.calls();
            prop_assert_eq!(calls[1].generated_text.as_deref(), Some(core.as_str()));
        }
    }
}
