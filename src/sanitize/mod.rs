//! Input sanitization for user text destined for a model prompt.
//!
//! [`InputSanitizer`] applies a fixed sequence of checks (first
//! violation wins) and, on success, returns the text after whitespace
//! normalization. Rejections log the violation kind, the input length,
//! and the pattern family that fired, never the text itself.

use crate::config::GuardConfig;
use crate::error::{SecurityViolation, SecurityViolationKind};
use crate::patterns::{
    self, PatternFamily, CONTROL_WHITESPACE, MULTI_NEWLINE, MULTI_SPACE, MULTI_TAB,
};

/// Minimum run length of a single repeated character that is rejected
/// as degenerate input.
const CHAR_RUN_LIMIT: usize = 10;

/// Word-window sizes checked for consecutive phrase repetition.
const PHRASE_WINDOW_RANGE: std::ops::RangeInclusive<usize> = 3..=6;

/// Minimum length of a repeated phrase worth rejecting.
const PHRASE_MIN_LEN: usize = 10;

/// Validates and normalizes raw user text before prompt embedding.
///
/// Stateless apart from its configured ceiling; concurrent use needs no
/// coordination.
#[derive(Debug, Clone)]
pub struct InputSanitizer {
    max_input_chars: usize,
}

impl Default for InputSanitizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_INPUT_CHARS)
    }
}

impl InputSanitizer {
    /// Create a sanitizer with an explicit input ceiling.
    #[must_use]
    pub const fn new(max_input_chars: usize) -> Self {
        Self { max_input_chars }
    }

    /// Create a sanitizer from pipeline configuration.
    #[must_use]
    pub const fn with_config(config: &GuardConfig) -> Self {
        Self::new(config.max_input_chars)
    }

    /// Validate `input` and return its normalized form.
    ///
    /// Checks run in a fixed order and the first violation wins:
    /// empty input, length ceiling, injection phrases, role
    /// manipulation, system-prompt leak, line-isolated delimiters,
    /// degenerate repetition.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityViolation`] with the matching closed-set kind.
    pub fn sanitize(&self, input: &str) -> Result<String, SecurityViolation> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(self.reject(
                SecurityViolation::new(SecurityViolationKind::EmptyInput, "input is blank"),
                0,
            ));
        }

        let length = trimmed.chars().count();
        if length > self.max_input_chars {
            return Err(self.reject(
                SecurityViolation::new(
                    SecurityViolationKind::TooLong,
                    format!("input exceeds {} characters", self.max_input_chars),
                ),
                length,
            ));
        }

        if let Some(pattern) = patterns::first_injection_match(trimmed) {
            return Err(self.reject(
                SecurityViolation::with_family(
                    SecurityViolationKind::InjectionDetected,
                    pattern.family,
                    format!("injection pattern '{}' matched", pattern.name),
                ),
                length,
            ));
        }

        if let Some(pattern) = patterns::first_role_match(trimmed) {
            return Err(self.reject(
                SecurityViolation::with_family(
                    SecurityViolationKind::RoleManipulation,
                    pattern.family,
                    format!("role-manipulation pattern '{}' matched", pattern.name),
                ),
                length,
            ));
        }

        if let Some(pattern) = patterns::first_leak_match(trimmed) {
            return Err(self.reject(
                SecurityViolation::with_family(
                    SecurityViolationKind::SystemPromptLeak,
                    pattern.family,
                    format!("system-prompt-leak pattern '{}' matched", pattern.name),
                ),
                length,
            ));
        }

        if patterns::has_line_delimiter(trimmed) {
            return Err(self.reject(
                SecurityViolation::with_family(
                    SecurityViolationKind::InjectionDetected,
                    PatternFamily::Delimiter,
                    "line-isolated dangerous delimiter",
                ),
                length,
            ));
        }

        if let Some(reason) = degenerate_repetition(trimmed) {
            return Err(self.reject(
                SecurityViolation::with_family(
                    SecurityViolationKind::InjectionDetected,
                    PatternFamily::Repetition,
                    reason,
                ),
                length,
            ));
        }

        Ok(normalize_whitespace(trimmed))
    }

    fn reject(&self, violation: SecurityViolation, input_length: usize) -> SecurityViolation {
        tracing::warn!(
            kind = violation.kind.as_str(),
            family = violation.family.map(PatternFamily::as_str),
            input_length,
            max_input_chars = self.max_input_chars,
            "input rejected"
        );
        violation
    }
}

/// Normalize whitespace without altering visible content.
///
/// Collapses 3+ newlines to 2, 2+ tabs to 1, and 4+ spaces to 3;
/// converts other control whitespace to a single space. The result is
/// trimmed, and the function is idempotent.
#[must_use]
pub fn normalize_whitespace(input: &str) -> String {
    let unified = input.replace("\r\n", "\n");
    let no_controls = CONTROL_WHITESPACE.replace_all(&unified, " ");
    let newlines = MULTI_NEWLINE.replace_all(&no_controls, "\n\n");
    let tabs = MULTI_TAB.replace_all(&newlines, "\t");
    MULTI_SPACE.replace_all(&tabs, "   ").trim().to_string()
}

/// Returns a rejection reason if the text is degenerate repeated
/// content: a single non-whitespace character run of ten or more, or a
/// phrase of three-plus words repeated back to back.
fn degenerate_repetition(text: &str) -> Option<&'static str> {
    let mut run_char = None;
    let mut run_len = 0usize;
    for c in text.chars() {
        if run_char == Some(c) {
            run_len += 1;
            if run_len >= CHAR_RUN_LIMIT && !c.is_whitespace() {
                return Some("repeated character run");
            }
        } else {
            run_char = Some(c);
            run_len = 1;
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    for window in PHRASE_WINDOW_RANGE {
        if words.len() < window * 2 {
            break;
        }
        for start in 0..=(words.len() - window * 2) {
            let first = &words[start..start + window];
            let second = &words[start + window..start + window * 2];
            if first == second {
                let phrase_len: usize = first.iter().map(|w| w.len()).sum::<usize>() + window - 1;
                let has_letters = first.iter().any(|w| w.chars().any(char::is_alphabetic));
                if phrase_len > PHRASE_MIN_LEN && has_letters {
                    return Some("repeated phrase");
                }
            }
        }
    }

    None
}

/// Sanitize user text with the default limits.
///
/// # Errors
///
/// Returns [`SecurityViolation`] with the matching closed-set kind.
pub fn sanitize_prompt_input(input: &str) -> Result<String, SecurityViolation> {
    InputSanitizer::default().sanitize(input)
}
