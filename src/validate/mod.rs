//! Validation and sanitization of model output.
//!
//! [`ResponseValidator`] applies a fixed sequence of checks to the raw
//! model response (first violation wins), then strips markup down to a
//! small no-attribute allow-list before the text is persisted or
//! displayed. The injection check defends against a model that was
//! manipulated mid-generation into echoing attacker phrasing.

use std::collections::HashMap;

use crate::config::GuardConfig;
use crate::error::{ValidationViolation, ValidationViolationKind};
use crate::patterns::{self, HTML_TAG};

/// Tokens shorter than this are ignored by the repetition check.
const REPETITION_MIN_TOKEN_LEN: usize = 4;

/// A token repeated more often than this is suspicious.
const REPETITION_COUNT_LIMIT: usize = 20;

/// A repeated token must also exceed this share of all tokens.
const REPETITION_SHARE_LIMIT: f64 = 0.3;

/// Validates and sanitizes raw model output.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    max_response_chars: usize,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_RESPONSE_CHARS)
    }
}

impl ResponseValidator {
    /// Create a validator with an explicit response ceiling.
    #[must_use]
    pub const fn new(max_response_chars: usize) -> Self {
        Self { max_response_chars }
    }

    /// Create a validator from pipeline configuration.
    #[must_use]
    pub const fn with_config(config: &GuardConfig) -> Self {
        Self::new(config.max_response_chars)
    }

    /// Validate `response` and return its sanitized form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationViolation`] with the matching closed-set
    /// kind.
    pub fn validate(&self, response: &str) -> Result<String, ValidationViolation> {
        let trimmed = response.trim();

        if trimmed.is_empty() {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::EmptyResponse,
                    "response is blank",
                ),
                0,
            ));
        }

        let length = trimmed.chars().count();
        if length > self.max_response_chars {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::TooLong,
                    format!("response exceeds {} characters", self.max_response_chars),
                ),
                length,
            ));
        }

        if let Some(pattern) = patterns::first_injection_match(trimmed) {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::PromptInjection,
                    format!("response echoes injection pattern '{}'", pattern.name),
                ),
                length,
            ));
        }

        if let Some(pattern) = patterns::first_markup_match(trimmed) {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::MaliciousContent,
                    format!("dangerous markup pattern '{}' matched", pattern.name),
                ),
                length,
            ));
        }

        if excessive_repetition(trimmed) {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::ExcessiveRepetition,
                    "response dominated by a repeated token",
                ),
                length,
            ));
        }

        let sanitized = sanitize_markup(trimmed);
        if sanitized.trim().is_empty() {
            return Err(self.reject(
                ValidationViolation::new(
                    ValidationViolationKind::InvalidContent,
                    "nothing displayable after markup sanitization",
                ),
                length,
            ));
        }

        Ok(sanitized)
    }

    fn reject(&self, violation: ValidationViolation, response_length: usize) -> ValidationViolation {
        tracing::warn!(
            kind = violation.kind.as_str(),
            response_length,
            max_response_chars = self.max_response_chars,
            "response rejected"
        );
        violation
    }
}

/// Strip markup down to the structural allow-list.
///
/// Allowed tags are kept with their attributes dropped; every other tag
/// is removed while its inner text is preserved.
#[must_use]
pub fn sanitize_markup(input: &str) -> String {
    HTML_TAG
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let closing = &caps[1];
            let name = caps[2].to_ascii_lowercase();
            if patterns::is_allowed_tag(&name) {
                format!("<{closing}{name}>")
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Returns true when a single long token dominates the response: more
/// than twenty occurrences and over thirty percent of all tokens.
#[allow(clippy::cast_precision_loss)]
fn excessive_repetition(text: &str) -> bool {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    for token in text.split_whitespace() {
        total += 1;
        if token.chars().count() >= REPETITION_MIN_TOKEN_LEN {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    if total == 0 {
        return false;
    }
    counts.values().any(|&count| {
        count > REPETITION_COUNT_LIMIT && count as f64 / total as f64 > REPETITION_SHARE_LIMIT
    })
}

/// Validate model output with the default limits.
///
/// # Errors
///
/// Returns [`ValidationViolation`] with the matching closed-set kind.
pub fn validate_llm_response(response: &str) -> Result<String, ValidationViolation> {
    ResponseValidator::default().validate(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn kind_of(result: Result<String, ValidationViolation>) -> ValidationViolationKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_plain_response_passes() {
        let response = "1. Build a shared treasury dashboard.\n2. Add milestone-based payouts.";
        assert_eq!(validate_llm_response(response).unwrap(), response);
    }

    #[test_case(""; "empty")]
    #[test_case("  \n "; "blank")]
    fn test_blank_response_rejected(response: &str) {
        assert_eq!(
            kind_of(validate_llm_response(response)),
            ValidationViolationKind::EmptyResponse
        );
    }

    #[test]
    fn test_over_ceiling_rejected() {
        let response = "x".repeat(50_001);
        assert_eq!(
            kind_of(validate_llm_response(&response)),
            ValidationViolationKind::TooLong
        );
    }

    #[test]
    fn test_at_ceiling_passes_length_check() {
        let response = "xy ".repeat(16_666); // 49_998 chars
        assert!(validate_llm_response(response.trim()).is_ok());
    }

    #[test]
    fn test_injection_echo_rejected() {
        let response = "Sure! I will now ignore all previous instructions as you asked.";
        assert_eq!(
            kind_of(validate_llm_response(response)),
            ValidationViolationKind::PromptInjection
        );
    }

    #[test_case("see <script>alert(1)</script>"; "script tag")]
    #[test_case("<img src=x onerror=alert(1)>"; "event handler")]
    #[test_case("click <a href=\"javascript:steal()\">here</a>"; "javascript uri")]
    #[test_case("embed via <iframe src=\"https://evil.example\">"; "iframe")]
    #[test_case("open <object data=\"x\">"; "object tag")]
    fn test_malicious_content_rejected(response: &str) {
        assert_eq!(
            kind_of(validate_llm_response(response)),
            ValidationViolationKind::MaliciousContent
        );
    }

    #[test]
    fn test_excessive_repetition_rejected() {
        // 30 repeats of one long token among 40 tokens total
        let mut response = "token ".repeat(30);
        response.push_str(&"filler word pad x ".repeat(2));
        response.push_str("end of output");
        assert_eq!(
            kind_of(validate_llm_response(&response)),
            ValidationViolationKind::ExcessiveRepetition
        );
    }

    #[test]
    fn test_moderate_repetition_passes() {
        // Repeated token stays under the count limit
        let mut response = "token ".repeat(15);
        response.push_str("and a longer tail of varied, useful content here");
        assert!(validate_llm_response(&response).is_ok());
    }

    #[test]
    fn test_frequent_but_diluted_token_passes() {
        // Over the count limit but under the thirty percent share
        let mut response = "token ".repeat(25);
        for i in 0..80 {
            response.push_str(&format!("word{i} "));
        }
        assert!(validate_llm_response(&response).is_ok());
    }

    #[test]
    fn test_allowed_tags_kept_without_attributes() {
        let response = "<p class=\"x\">One</p><h2 id=\"t\">Two</h2><ul><li>Three</li></ul>";
        let sanitized = validate_llm_response(response).unwrap();
        assert_eq!(
            sanitized,
            "<p>One</p><h2>Two</h2><ul><li>Three</li></ul>"
        );
    }

    #[test]
    fn test_disallowed_tags_stripped_text_kept() {
        let response = "<div><span>Keep the text</span></div> and <em>emphasis</em>";
        let sanitized = validate_llm_response(response).unwrap();
        assert_eq!(sanitized, "Keep the text and <em>emphasis</em>");
    }

    #[test]
    fn test_markup_only_response_rejected() {
        assert_eq!(
            kind_of(validate_llm_response("<div><span></span></div>")),
            ValidationViolationKind::InvalidContent
        );
    }

    #[test]
    fn test_blockquote_and_lists_survive() {
        let response = "<blockquote>Quote</blockquote><ol><li>First</li><li>Second</li></ol>";
        assert_eq!(validate_llm_response(response).unwrap(), response);
    }

    #[test]
    fn test_custom_ceiling() {
        let validator = ResponseValidator::new(10);
        assert_eq!(
            validator.validate("12345678901").unwrap_err().kind,
            ValidationViolationKind::TooLong
        );
        assert!(validator.validate("1234567890").is_ok());
    }

    proptest! {
        #[test]
        fn prop_validated_output_is_clean(response in ".{1,300}") {
            if let Ok(sanitized) = validate_llm_response(&response) {
                let lower = sanitized.to_lowercase();
                prop_assert!(!lower.contains("<script"));
                prop_assert!(!lower.contains("javascript:"));
                prop_assert!(!lower.contains("<iframe"));
            }
        }
    }
}
