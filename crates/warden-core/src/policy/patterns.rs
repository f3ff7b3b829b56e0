//! Detection patterns used by the heuristic policy.
//!
//! Every detector reports only the byte span of its first match, never
//! the matched text, so decisions can be logged and audited without
//! copying sensitive content.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    static ref PHONE_PATTERN: Regex = Regex::new(
        r"(?:\+?1[-.\s]?)?(?:\([0-9]{3}\)|[0-9]{3})[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}"
    ).unwrap();

    /// XXX-XX-XXXX with dash or space separators only. Bare nine-digit
    /// runs are too common in legal forms (case and parcel numbers).
    static ref SSN_PATTERN: Regex = Regex::new(
        r"\b\d{3}[-\s]\d{2}[-\s]\d{4}\b"
    ).unwrap();

    static ref CREDIT_CARD_PATTERN: Regex = Regex::new(
        r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b"
    ).unwrap();

    static ref API_KEY_PATTERN: Regex = Regex::new(
        r#"(?i)(api[_-]?key|secret[_-]?key|access[_-]?token|auth[_-]?token|bearer|password|secret|token)[\s:=]+['"]?[a-zA-Z0-9_-]{16,}['"]?"#
    ).unwrap();

    static ref AWS_KEY_PATTERN: Regex = Regex::new(
        r"(?i)(AKIA|ABIA|ACCA|AGPA|AIDA|AIPA|ANPA|ANVA|AROA|ASCA|ASIA)[A-Z0-9]{16}"
    ).unwrap();

    static ref PROMPT_INJECTION_PATTERN: Regex = Regex::new(
        r"(?i)(ignore\s+(all\s+)?(previous|prior|above)\s+instructions|disregard\s+(the\s+)?system\s+prompt|reveal\s+(your\s+)?system\s+prompt|you\s+are\s+now\s+in\s+developer\s+mode)"
    ).unwrap();
}

/// A named content detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detector {
    Email,
    Phone,
    Ssn,
    CreditCard,
    ApiKey,
    AwsKey,
    PromptInjection,
}

impl Detector {
    fn pattern(&self) -> &'static Regex {
        match self {
            Detector::Email => &EMAIL_PATTERN,
            Detector::Phone => &PHONE_PATTERN,
            Detector::Ssn => &SSN_PATTERN,
            Detector::CreditCard => &CREDIT_CARD_PATTERN,
            Detector::ApiKey => &API_KEY_PATTERN,
            Detector::AwsKey => &AWS_KEY_PATTERN,
            Detector::PromptInjection => &PROMPT_INJECTION_PATTERN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Detector::Email => "email",
            Detector::Phone => "phone",
            Detector::Ssn => "ssn",
            Detector::CreditCard => "credit_card",
            Detector::ApiKey => "api_key",
            Detector::AwsKey => "aws_key",
            Detector::PromptInjection => "prompt_injection",
        }
    }

    /// Byte span of the first match, if any.
    pub fn find(&self, content: &str) -> Option<(usize, usize)> {
        self.pattern().find(content).map(|m| (m.start(), m.end()))
    }

    pub fn matches(&self, content: &str) -> bool {
        self.pattern().is_match(content)
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive phrase search. Returns the byte span in `content`.
pub fn find_phrase(content: &str, phrase: &str) -> Option<(usize, usize)> {
    if phrase.is_empty() {
        return None;
    }

    let lower_content = content.to_lowercase();
    let lower_phrase = phrase.to_lowercase();
    let start = lower_content.find(&lower_phrase)?;

    // Non-ASCII lowercasing can shift byte offsets; clamp to the original.
    let end = (start + lower_phrase.len()).min(content.len());
    Some((start.min(end), end))
}
