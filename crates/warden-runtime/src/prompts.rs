//! Prompts for the consumer adapters.
//!
//! Each adapter sends a fixed system prompt (stable, cache friendly) and a
//! user prompt built from the request. Both ask for JSON only; the adapters
//! validate the reply against the matching embedded schema.

use serde_json::Value as JsonValue;

/// System prompt for form-answer review.
pub const FORM_REVIEW_SYSTEM_PROMPT: &str = r#"
You review answers a user entered into a legal document form.

Point out answers that look incomplete, inconsistent with each other,
or inconsistent with the field's description in the schema.
You do not give legal advice and you never predict outcomes.

## Output Format (JSON)
An array, one entry per problem found:
[
  {
    "fieldId": "the field's id from the schema, or \"general\"",
    "importance": "info" | "warning" | "error",
    "message": "one or two sentences addressed to the user"
  }
]

Return [] when nothing needs attention. Return JSON only.
"#;

/// System prompt for legal-term detection.
pub const LEGAL_TERMS_SYSTEM_PROMPT: &str = r#"
You find legal terms of art in document text and explain them in plain language.

## Output Format (JSON)
[
  { "term": "the term exactly as it appears", "explanation": "one plain sentence" }
]

List each term once. Return [] when there are none. Return JSON only.
"#;

/// Longest document excerpt sent for legal-term detection, in characters.
pub const MAX_TERMS_EXCERPT_CHARS: usize = 6_000;

/// Build the form-review user prompt.
pub fn form_review_prompt(
    document_type: &str,
    schema: &JsonValue,
    answers: &JsonValue,
    language: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Document type: {}\n\n## Form schema\n{}\n\n## Answers\n{}\n",
        document_type,
        pretty(schema),
        pretty(answers),
    );

    if let Some(language) = language {
        prompt.push_str(&format!("\nWrite every message in language: {}\n", language));
    }

    prompt
}

/// Build the legal-term detection user prompt. Long documents are cut at a
/// character boundary.
pub fn legal_terms_prompt(document_text: &str, language: Option<&str>) -> String {
    let excerpt: String = document_text.chars().take(MAX_TERMS_EXCERPT_CHARS).collect();

    let mut prompt = format!("## Document text\n{}\n", excerpt);
    if let Some(language) = language {
        prompt.push_str(&format!("\nWrite explanations in language: {}\n", language));
    }
    prompt
}

fn pretty(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
