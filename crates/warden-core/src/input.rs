//! The context submitted to a policy evaluator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel used when the caller does not name one.
pub const DEFAULT_CHANNEL: &str = "general";

/// Errors from building a [`GuardrailInput`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Prompt text is required")]
    EmptyPrompt,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Languages the platform generates documents in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            other => Err(InputError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// Immutable request context for both guardrail stages.
///
/// Fields are private: once built, an input cannot change, so the
/// prompt-stage and response-stage checks are guaranteed to see the
/// same context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailInput {
    prompt: String,
    channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jurisdiction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}

impl GuardrailInput {
    /// Start building an input for `prompt`.
    pub fn builder(prompt: impl Into<String>) -> GuardrailInputBuilder {
        GuardrailInputBuilder {
            prompt: prompt.into(),
            channel: None,
            language: None,
            jurisdiction: None,
            context: None,
            metadata: None,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn jurisdiction(&self) -> Option<&str> {
        self.jurisdiction.as_deref()
    }

    /// Context entries, empty when none were supplied.
    pub fn context(&self) -> &[String] {
        self.context.as_deref().unwrap_or(&[])
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.as_ref()
    }
}

/// Builder for [`GuardrailInput`].
#[derive(Debug, Clone)]
pub struct GuardrailInputBuilder {
    prompt: String,
    channel: Option<String>,
    language: Option<Language>,
    jurisdiction: Option<String>,
    context: Option<Vec<String>>,
    metadata: Option<BTreeMap<String, String>>,
}

impl GuardrailInputBuilder {
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn language(mut self, language: Option<Language>) -> Self {
        self.language = language;
        self
    }

    pub fn jurisdiction(mut self, jurisdiction: Option<String>) -> Self {
        self.jurisdiction = jurisdiction;
        self
    }

    pub fn context(mut self, context: Option<Vec<String>>) -> Self {
        self.context = context;
        self
    }

    pub fn metadata(mut self, metadata: Option<BTreeMap<String, String>>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Build the input. Fails when the prompt is blank.
    pub fn build(self) -> Result<GuardrailInput, InputError> {
        if self.prompt.trim().is_empty() {
            return Err(InputError::EmptyPrompt);
        }

        let channel = self
            .channel
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());

        Ok(GuardrailInput {
            prompt: self.prompt,
            channel,
            language: self.language,
            jurisdiction: self.jurisdiction,
            context: self.context,
            metadata: self.metadata,
        })
    }
}
