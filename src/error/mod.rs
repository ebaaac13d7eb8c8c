//! Error types for the idea-guard pipeline.
//!
//! This module defines a hierarchical error system:
//! - [`GuardError`]: Top-level pipeline errors
//! - [`SecurityViolation`]: Input sanitization rejections
//! - [`ValidationViolation`]: Model response rejections
//! - [`ParseGuardError`]: Guarded JSON deserialization failures
//! - [`InvocationError`]: Model backend failures
//! - [`FallbackError`]: Recovery exhaustion
//! - [`ConfigError`]: Configuration errors
//!
//! Every rejection carries a closed-set kind so callers can branch
//! deterministically without pattern-matching free text. All errors
//! implement `Send + Sync` for async compatibility.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patterns::PatternFamily;
use crate::recovery::FallbackStrategy;

/// Top-level pipeline error.
///
/// This is the main error type returned by public API functions.
/// It wraps all stage errors for unified error handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// Input sanitization rejected the user text.
    #[error("security violation: {0}")]
    Security(#[from] SecurityViolation),

    /// Response validation rejected the model output.
    #[error("response validation failed: {0}")]
    Validation(#[from] ValidationViolation),

    /// Guarded deserialization rejected structured text.
    #[error("parse guard rejected input: {0}")]
    Parse(#[from] ParseGuardError),

    /// The model invocation failed.
    #[error("model invocation failed: {0}")]
    Invocation(#[from] InvocationError),

    /// Every recovery strategy failed.
    #[error("recovery exhausted: {0}")]
    Fallback(#[from] FallbackError),
}

impl GuardError {
    /// Returns a stable type tag for logging.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        match self {
            Self::Security(_) => "security",
            Self::Validation(_) => "validation",
            Self::Parse(_) => "parse",
            Self::Invocation(_) => "invocation",
            Self::Fallback(_) => "fallback",
        }
    }

    /// Returns the closed-set kind of the underlying violation, if any.
    #[must_use]
    pub const fn violation_kind(&self) -> Option<&'static str> {
        match self {
            Self::Security(v) => Some(v.kind.as_str()),
            Self::Validation(v) => Some(v.kind.as_str()),
            Self::Parse(v) => Some(v.kind.as_str()),
            Self::Invocation(_) | Self::Fallback(_) => None,
        }
    }
}

/// Closed set of input sanitization rejection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityViolationKind {
    /// Input was missing or blank after trimming.
    EmptyInput,
    /// Input exceeded the configured length ceiling.
    TooLong,
    /// An injection phrase, dangerous delimiter, or degenerate
    /// repetition was detected.
    InjectionDetected,
    /// A jailbreak or persona-change phrase was detected.
    RoleManipulation,
    /// The text asks to reveal the system prompt or hidden instructions.
    SystemPromptLeak,
    /// The prompt template was empty, had no placeholder, or left
    /// placeholders unresolved.
    TemplateError,
}

impl SecurityViolationKind {
    /// Returns the kind as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::TooLong => "TOO_LONG",
            Self::InjectionDetected => "INJECTION_DETECTED",
            Self::RoleManipulation => "ROLE_MANIPULATION",
            Self::SystemPromptLeak => "SYSTEM_PROMPT_LEAK",
            Self::TemplateError => "TEMPLATE_ERROR",
        }
    }
}

impl std::fmt::Display for SecurityViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input sanitization rejection.
///
/// `family` names the pattern family that fired, when a pattern was
/// involved. It is part of the fixed logging vocabulary and lets the
/// prompt builder recognise the delimiter-only variant without string
/// matching. The message never contains the offending text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SecurityViolation {
    /// The closed-set rejection kind.
    pub kind: SecurityViolationKind,
    /// Pattern family that fired, if the rejection was pattern-based.
    pub family: Option<PatternFamily>,
    /// Human-readable description (no user content).
    pub message: String,
}

impl SecurityViolation {
    /// Create a violation without a pattern family.
    #[must_use]
    pub fn new(kind: SecurityViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            family: None,
            message: message.into(),
        }
    }

    /// Create a pattern-based violation.
    #[must_use]
    pub fn with_family(
        kind: SecurityViolationKind,
        family: PatternFamily,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            family: Some(family),
            message: message.into(),
        }
    }

    /// Returns true if this is the delimiter-only injection variant.
    ///
    /// The prompt builder treats this variant leniently: the offending
    /// delimiters are escaped rather than the whole input rejected.
    #[must_use]
    pub fn is_delimiter_only(&self) -> bool {
        self.kind == SecurityViolationKind::InjectionDetected
            && self.family == Some(PatternFamily::Delimiter)
    }
}

/// Closed set of response validation rejection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationViolationKind {
    /// Response was missing or blank.
    EmptyResponse,
    /// Markup sanitization left nothing displayable.
    InvalidContent,
    /// Response exceeded the configured length ceiling.
    TooLong,
    /// Response echoes injection phrasing.
    PromptInjection,
    /// Response contains forbidden markup, attributes, or URI schemes.
    MaliciousContent,
    /// Response is dominated by a repeated token.
    ExcessiveRepetition,
}

impl ValidationViolationKind {
    /// Returns the kind as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::InvalidContent => "INVALID_CONTENT",
            Self::TooLong => "TOO_LONG",
            Self::PromptInjection => "PROMPT_INJECTION",
            Self::MaliciousContent => "MALICIOUS_CONTENT",
            Self::ExcessiveRepetition => "EXCESSIVE_REPETITION",
        }
    }
}

impl std::fmt::Display for ValidationViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Model response rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ValidationViolation {
    /// The closed-set rejection kind.
    pub kind: ValidationViolationKind,
    /// Human-readable description (no response content).
    pub message: String,
}

impl ValidationViolation {
    /// Create a validation violation.
    #[must_use]
    pub fn new(kind: ValidationViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Closed set of parse-guard rejection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseGuardErrorKind {
    /// Input was missing or blank.
    EmptyInput,
    /// The underlying parser rejected the text.
    SyntaxError,
    /// Byte size exceeded the configured maximum.
    TooLarge,
    /// Nesting depth exceeded the configured maximum.
    TooDeep,
    /// A dangerous object key was present and rejection was requested.
    SecurityViolation,
}

impl ParseGuardErrorKind {
    /// Returns the kind as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::TooLarge => "TOO_LARGE",
            Self::TooDeep => "TOO_DEEP",
            Self::SecurityViolation => "SECURITY_VIOLATION",
        }
    }
}

impl std::fmt::Display for ParseGuardErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Guarded deserialization failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ParseGuardError {
    /// The closed-set rejection kind.
    pub kind: ParseGuardErrorKind,
    /// Human-readable description; for syntax errors this carries the
    /// underlying parser message, never the parsed text.
    pub message: String,
}

impl ParseGuardError {
    /// Create a parse-guard error.
    #[must_use]
    pub fn new(kind: ParseGuardErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Model backend failures.
///
/// These errors represent failures of the injected model-invocation
/// function. The pipeline treats a timeout identically to any other
/// invocation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The call exceeded the configured timeout.
    #[error("model invocation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Network communication error.
    #[error("network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The backend reported an error.
    #[error("model backend error: {message}")]
    Backend {
        /// Description of the backend error.
        message: String,
    },

    /// The call was cancelled by the caller.
    #[error("model invocation cancelled")]
    Cancelled,
}

impl InvocationError {
    /// Returns true if this error is retryable.
    ///
    /// Timeouts and network errors are transient; backend rejections
    /// and cancellations are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}

/// Recovery exhaustion.
///
/// Raised when every configured fallback strategy failed. Callers must
/// treat this as fatal for the request and surface a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("all recovery strategies failed (last attempted: {last_strategy}): {cause}")]
pub struct FallbackError {
    /// The last strategy that was attempted.
    pub last_strategy: FallbackStrategy,
    /// Rendered description of the original error that triggered recovery.
    pub cause: String,
}

impl FallbackError {
    /// Create a fallback error.
    #[must_use]
    pub fn new(last_strategy: FallbackStrategy, cause: impl Into<String>) -> Self {
        Self {
            last_strategy,
            cause: cause.into(),
        }
    }
}

/// Ordered error severity used for logging and alert routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine failure, no operator attention needed.
    Low,
    /// Transient failure worth watching.
    Medium,
    /// Likely attack or data-integrity issue.
    High,
    /// Reserved for caller-side escalation.
    Critical,
}

impl Severity {
    /// Returns the severity as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}
