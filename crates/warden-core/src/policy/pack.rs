//! Policy packs: the rule sets the heuristic evaluator enforces.
//!
//! Packs are plain YAML (or JSON) documents:
//!
//! ```yaml
//! name: "platform-default"
//! version: "1.0"
//! detector_rules:
//!   - id: "S1"
//!     detector: ssn
//!     action: block
//!     reason: "Sensitive personal data detected"
//!     escalate: true
//! phrase_rules:
//!   - id: "R1"
//!     phrase: "guaranteed outcome"
//!     stages: [response]
//!     action: review
//!     reason: "Response promises a legal outcome"
//! channels:
//!   legal_terms:
//!     disabled_rules: ["R1"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::{GuardrailStage, Verdict};

use super::patterns::Detector;

/// Errors that can occur when loading a policy pack.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Policy validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// What a matching rule does to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Block,
    Review,
}

impl RuleAction {
    pub fn verdict(&self) -> Verdict {
        match self {
            RuleAction::Block => Verdict::Block,
            RuleAction::Review => Verdict::Review,
        }
    }
}

fn both_stages() -> Vec<GuardrailStage> {
    vec![GuardrailStage::Prompt, GuardrailStage::Response]
}

/// A rule driven by one of the built-in detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorRule {
    pub id: String,
    pub detector: Detector,
    #[serde(default = "both_stages")]
    pub stages: Vec<GuardrailStage>,
    pub action: RuleAction,
    pub reason: String,
    #[serde(default)]
    pub escalate: bool,
}

/// A rule that matches a literal phrase, case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseRule {
    pub id: String,
    pub phrase: String,
    #[serde(default = "both_stages")]
    pub stages: Vec<GuardrailStage>,
    pub action: RuleAction,
    pub reason: String,
    #[serde(default)]
    pub escalate: bool,
}

/// Per-channel adjustments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelOverrides {
    #[serde(default)]
    pub disabled_rules: Vec<String>,
}

/// A complete rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPack {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub detector_rules: Vec<DetectorRule>,

    #[serde(default)]
    pub phrase_rules: Vec<PhraseRule>,

    /// Keyed by channel tag; BTreeMap keeps serialization stable
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelOverrides>,
}

impl PolicyPack {
    /// Parse a pack from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let pack: PolicyPack = serde_yaml::from_str(yaml)?;
        pack.validate()?;
        Ok(pack)
    }

    /// Parse a pack from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let pack: PolicyPack = serde_json::from_str(json)?;
        pack.validate()?;
        Ok(pack)
    }

    /// Parse a pack from a file; `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// The pack shipped with the gateway.
    pub fn builtin() -> Self {
        let sensitive = "Sensitive personal data detected";
        Self {
            name: "platform-default".to_string(),
            version: Some("1.0".to_string()),
            detector_rules: vec![
                DetectorRule {
                    id: "S1".to_string(),
                    detector: Detector::Ssn,
                    stages: both_stages(),
                    action: RuleAction::Block,
                    reason: sensitive.to_string(),
                    escalate: true,
                },
                DetectorRule {
                    id: "S2".to_string(),
                    detector: Detector::CreditCard,
                    stages: both_stages(),
                    action: RuleAction::Block,
                    reason: sensitive.to_string(),
                    escalate: true,
                },
                DetectorRule {
                    id: "C1".to_string(),
                    detector: Detector::ApiKey,
                    stages: both_stages(),
                    action: RuleAction::Block,
                    reason: "Credentials detected".to_string(),
                    escalate: true,
                },
                DetectorRule {
                    id: "C2".to_string(),
                    detector: Detector::AwsKey,
                    stages: both_stages(),
                    action: RuleAction::Block,
                    reason: "Credentials detected".to_string(),
                    escalate: true,
                },
                DetectorRule {
                    id: "I1".to_string(),
                    detector: Detector::PromptInjection,
                    stages: vec![GuardrailStage::Prompt],
                    action: RuleAction::Block,
                    reason: "Prompt injection attempt detected".to_string(),
                    escalate: false,
                },
            ],
            phrase_rules: vec![
                PhraseRule {
                    id: "R1".to_string(),
                    phrase: "guaranteed outcome".to_string(),
                    stages: vec![GuardrailStage::Response],
                    action: RuleAction::Review,
                    reason: "Response promises a legal outcome".to_string(),
                    escalate: true,
                },
                PhraseRule {
                    id: "R2".to_string(),
                    phrase: "this is legal advice".to_string(),
                    stages: vec![GuardrailStage::Response],
                    action: RuleAction::Review,
                    reason: "Response presents itself as legal advice".to_string(),
                    escalate: true,
                },
            ],
            channels: BTreeMap::new(),
        }
    }

    /// Whether `rule_id` is switched off for `channel`.
    pub fn is_disabled(&self, channel: &str, rule_id: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|o| o.disabled_rules.iter().any(|id| id == rule_id))
    }

    /// Validate the pack structure.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::MissingField("name".to_string()));
        }

        let mut seen = HashSet::new();
        let rules = self
            .detector_rules
            .iter()
            .map(|r| (&r.id, &r.reason, &r.stages))
            .chain(self.phrase_rules.iter().map(|r| (&r.id, &r.reason, &r.stages)));

        for (id, reason, stages) in rules {
            if id.trim().is_empty() {
                return Err(PolicyError::MissingField("rule id".to_string()));
            }
            if !seen.insert(id.as_str()) {
                return Err(PolicyError::ValidationError(format!(
                    "Duplicate rule ID: {}",
                    id
                )));
            }
            if reason.trim().is_empty() {
                return Err(PolicyError::MissingField(format!("{}.reason", id)));
            }
            if stages.is_empty() {
                return Err(PolicyError::ValidationError(format!(
                    "Rule {} applies to no stage",
                    id
                )));
            }
        }

        for rule in &self.phrase_rules {
            if rule.phrase.trim().is_empty() {
                return Err(PolicyError::MissingField(format!("{}.phrase", rule.id)));
            }
        }

        for (channel, overrides) in &self.channels {
            for id in &overrides.disabled_rules {
                if !seen.contains(id.as_str()) {
                    return Err(PolicyError::ValidationError(format!(
                        "Channel '{}' disables unknown rule '{}'",
                        channel, id
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Default for PolicyPack {
    fn default() -> Self {
        Self::builtin()
    }
}
