//! Scripted test doubles for the evaluator and backend contracts.
//!
//! Both record every call so tests can assert on what the gateway sent
//! and how often.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use warden_core::{Decision, DecisionStage, GuardrailInput};

use crate::evaluator::{EvaluatorError, PolicyEvaluator};
use crate::providers::{
    ChatCompletionRequest, CompletionResult, GenerationBackend, ModelId, ProviderError,
};

/// One scripted evaluator response.
#[derive(Debug)]
pub enum EvaluatorStep {
    Decide(Decision),
    Fail(EvaluatorError),
    /// Never resolves; exercises deadlines and cancellation.
    Hang,
}

/// A recorded evaluator call.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorCall {
    pub prompt: String,
    pub channel: String,
    pub generated_text: Option<String>,
}

/// Evaluator that replays a queue of steps, then allows everything.
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    steps: Mutex<VecDeque<EvaluatorStep>>,
    calls: Mutex<Vec<EvaluatorCall>>,
}

impl ScriptedEvaluator {
    pub fn new(steps: impl IntoIterator<Item = EvaluatorStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EvaluatorCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl PolicyEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        input: &GuardrailInput,
        generated_text: Option<&str>,
    ) -> Result<Decision, EvaluatorError> {
        self.calls.lock().push(EvaluatorCall {
            prompt: input.prompt().to_string(),
            channel: input.channel().to_string(),
            generated_text: generated_text.map(str::to_string),
        });

        let step = self.steps.lock().pop_front();
        match step {
            Some(EvaluatorStep::Decide(decision)) => Ok(decision),
            Some(EvaluatorStep::Fail(err)) => Err(err),
            Some(EvaluatorStep::Hang) => {
                futures::future::pending::<()>().await;
                Err(EvaluatorError::Internal("unreachable".to_string()))
            }
            None => Ok(Decision::allow(DecisionStage::PromptGuard)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// One scripted backend response.
#[derive(Debug)]
pub enum BackendStep {
    /// A single-choice result with this content.
    Content(String),
    /// A result returned exactly as given.
    Raw(CompletionResult),
    Fail(ProviderError),
    /// Sleep before replying with the content.
    Delayed(Duration, String),
    /// Never resolves.
    Hang,
}

/// Backend that replays a queue of steps, then repeats its default reply.
#[derive(Debug)]
pub struct ScriptedBackend {
    configured: bool,
    default_reply: String,
    steps: Mutex<VecDeque<BackendStep>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(steps: impl IntoIterator<Item = BackendStep>) -> Self {
        Self {
            configured: true,
            default_reply: String::new(),
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` to every request.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            default_reply: text.into(),
            ..Self::new([])
        }
    }

    /// Reports itself unconfigured.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new([])
        }
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn resolve_model(&self, requested: Option<&str>) -> ModelId {
        ModelId::new(requested.unwrap_or("scripted-model"))
    }

    async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<CompletionResult, ProviderError> {
        let model = request.model.to_string();
        self.requests.lock().push(request);

        let step = self.steps.lock().pop_front();
        match step {
            Some(BackendStep::Content(content)) => Ok(CompletionResult::from_content(model, content)),
            Some(BackendStep::Raw(result)) => Ok(result),
            Some(BackendStep::Fail(err)) => Err(err),
            Some(BackendStep::Delayed(delay, content)) => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResult::from_content(model, content))
            }
            Some(BackendStep::Hang) => {
                futures::future::pending::<()>().await;
                Err(ProviderError::Cancelled)
            }
            None => Ok(CompletionResult::from_content(model, self.default_reply.clone())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
