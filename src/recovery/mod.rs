//! Failure recovery for the generation pipeline.
//!
//! The [`RecoveryOrchestrator`] is the only intentionally forgiving
//! layer: it absorbs upstream failures and produces a safe user-facing
//! result by trying ordered [`FallbackStrategy`] values. If every
//! strategy fails it raises a [`FallbackError`] that callers must treat
//! as fatal for the request.
//!
//! Structural security verdicts on the input are never re-submitted to
//! the model: retrying unchanged content cannot change a structural
//! verdict, so the retry strategy is skipped outright for them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::GuardConfig;
use crate::error::{
    FallbackError, GuardError, InvocationError, ParseGuardErrorKind, SecurityViolationKind,
    Severity, ValidationViolationKind,
};
use crate::prompt::{SecurePromptBuilder, SIMPLE_RETRY_TEMPLATE};
use crate::traits::{invoke_with_timeout, ModelInvoker, ResponseCache};
use crate::validate::ResponseValidator;

/// Maximum length of a sanitized error message, in characters.
const MAX_REPORT_MESSAGE_CHARS: usize = 500;

/// Maximum length of a rendered source chain, in characters.
const MAX_REPORT_CHAIN_CHARS: usize = 2000;

/// Canned response for briefs above the long-input threshold.
const LONG_TEMPLATE_RESPONSE: &str = "We could not generate tailored suggestions for this \
brief right now. As a starting point:\n\n\
1. Restate the core problem in one sentence and list the constraints that matter most.\n\
2. Sketch the smallest version of a solution a reviewer could evaluate end to end.\n\
3. Name the riskiest assumption and the quickest experiment that would test it.\n\n\
Please try again in a few minutes for suggestions tailored to your brief.";

/// Canned response for short briefs.
const SHORT_TEMPLATE_RESPONSE: &str =
    "We could not generate suggestions right now. Please try again in a few minutes.";

/// An ordered recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Re-invoke the model with a minimal fixed template.
    RetryWithSimplePrompt,
    /// Look up a content-hash-keyed cache (hook only).
    UseCachedResponse,
    /// Return a canned template response.
    ReturnTemplateResponse,
    /// Compose a degradation message from the originating error.
    GracefulDegradation,
}

impl FallbackStrategy {
    /// Returns the strategy name as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryWithSimplePrompt => "retry_with_simple_prompt",
            Self::UseCachedResponse => "use_cached_response",
            Self::ReturnTemplateResponse => "return_template_response",
            Self::GracefulDegradation => "graceful_degradation",
        }
    }
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for a recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Retry budget for strategies that re-invoke the model.
    pub max_retries: u32,
    /// Base delay between retries, in milliseconds, doubled after each
    /// attempt.
    pub retry_delay_ms: u64,
    /// Strategies, tried in order.
    pub strategies: Vec<FallbackStrategy>,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            retry_delay_ms: crate::config::DEFAULT_RETRY_DELAY_MS,
            strategies: vec![
                FallbackStrategy::RetryWithSimplePrompt,
                FallbackStrategy::ReturnTemplateResponse,
            ],
        }
    }
}

#[derive(Debug, Error)]
enum StrategyError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("{0}")]
    Unavailable(&'static str),
}

/// Tries ordered recovery strategies when a pipeline stage fails.
pub struct RecoveryOrchestrator {
    invoker: Arc<dyn ModelInvoker>,
    cache: Option<Arc<dyn ResponseCache>>,
    builder: SecurePromptBuilder,
    validator: ResponseValidator,
    config: GuardConfig,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("cache", &self.cache.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RecoveryOrchestrator {
    /// Create an orchestrator with default configuration.
    #[must_use]
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self::with_config(invoker, GuardConfig::default())
    }

    /// Create an orchestrator with explicit configuration.
    #[must_use]
    pub fn with_config(invoker: Arc<dyn ModelInvoker>, config: GuardConfig) -> Self {
        let sanitizer = crate::sanitize::InputSanitizer::with_config(&config);
        Self {
            invoker,
            cache: None,
            builder: SecurePromptBuilder::with_sanitizer(sanitizer),
            validator: ResponseValidator::with_config(&config),
            config,
        }
    }

    /// Attach a cache for the `UseCachedResponse` strategy.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Try the configured strategies in order and return the first
    /// result produced without error.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError`] naming the last attempted strategy when
    /// every strategy fails.
    pub async fn recover(
        &self,
        original: &GuardError,
        user_input: &str,
        options: &RecoveryOptions,
    ) -> Result<String, FallbackError> {
        let severity = classify_error_severity(original);
        tracing::info!(
            error_type = original.type_tag(),
            kind = original.violation_kind(),
            severity = severity.as_str(),
            input_length = user_input.trim().chars().count(),
            "entering recovery"
        );

        let structural_verdict = is_structural_input_verdict(original);
        let mut last_attempted = None;

        for &strategy in &options.strategies {
            last_attempted = Some(strategy);

            if strategy == FallbackStrategy::RetryWithSimplePrompt && structural_verdict {
                tracing::info!(
                    strategy = strategy.as_str(),
                    "skipping model retry, structural verdict cannot change on identical input"
                );
                continue;
            }

            match self.attempt(strategy, original, user_input, options).await {
                Ok(text) => {
                    tracing::info!(strategy = strategy.as_str(), "recovery strategy succeeded");
                    return Ok(text);
                }
                Err(reason) => {
                    tracing::warn!(
                        strategy = strategy.as_str(),
                        reason = %reason,
                        "recovery strategy failed"
                    );
                }
            }
        }

        let last = last_attempted.unwrap_or(FallbackStrategy::ReturnTemplateResponse);
        tracing::error!(
            last_strategy = last.as_str(),
            error_type = original.type_tag(),
            "recovery exhausted"
        );
        Err(FallbackError::new(last, original.to_string()))
    }

    async fn attempt(
        &self,
        strategy: FallbackStrategy,
        original: &GuardError,
        user_input: &str,
        options: &RecoveryOptions,
    ) -> Result<String, StrategyError> {
        match strategy {
            FallbackStrategy::RetryWithSimplePrompt => {
                self.retry_with_simple_prompt(user_input, options).await
            }
            FallbackStrategy::UseCachedResponse => self.use_cached_response(user_input).await,
            FallbackStrategy::ReturnTemplateResponse => Ok(canned_template_response(
                self.config.long_input_threshold,
                user_input,
            )),
            FallbackStrategy::GracefulDegradation => Ok(degradation_message(original)),
        }
    }

    async fn retry_with_simple_prompt(
        &self,
        user_input: &str,
        options: &RecoveryOptions,
    ) -> Result<String, StrategyError> {
        let prompt = self
            .builder
            .build(SIMPLE_RETRY_TEMPLATE, user_input)
            .map_err(GuardError::from)?;

        let attempts = options.max_retries.max(1);
        let mut delay = options.retry_delay_ms;
        let mut last_error: Option<GuardError> = None;

        for attempt in 1..=attempts {
            let result =
                invoke_with_timeout(&*self.invoker, &prompt, self.config.invoke_timeout_ms).await;
            match result {
                Ok(response) => match self.validator.validate(&response) {
                    Ok(valid) => return Ok(valid),
                    Err(violation) => last_error = Some(violation.into()),
                },
                Err(error) => last_error = Some(error.into()),
            }

            tracing::debug!(attempt, attempts, "simple-prompt retry failed");
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(last_error
            .unwrap_or_else(|| {
                GuardError::Invocation(InvocationError::Backend {
                    message: "retry budget exhausted".to_string(),
                })
            })
            .into())
    }

    async fn use_cached_response(&self, user_input: &str) -> Result<String, StrategyError> {
        let Some(cache) = &self.cache else {
            return Err(StrategyError::Unavailable("no cache configured"));
        };
        let hash = content_hash(user_input);
        match cache.lookup(&hash).await {
            Some(hit) => Ok(hit),
            None => Err(StrategyError::Unavailable("cache miss")),
        }
    }
}

/// SHA-256 content hash used to key the response cache.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// True for input-side verdicts a re-submission cannot change.
fn is_structural_input_verdict(error: &GuardError) -> bool {
    matches!(
        error,
        GuardError::Security(violation) if matches!(
            violation.kind,
            SecurityViolationKind::InjectionDetected
                | SecurityViolationKind::RoleManipulation
                | SecurityViolationKind::SystemPromptLeak
        )
    )
}

fn canned_template_response(long_input_threshold: usize, user_input: &str) -> String {
    if user_input.trim().chars().count() > long_input_threshold {
        LONG_TEMPLATE_RESPONSE.to_string()
    } else {
        SHORT_TEMPLATE_RESPONSE.to_string()
    }
}

fn degradation_message(original: &GuardError) -> String {
    let lead = match original {
        GuardError::Security(_) => "Parts of the brief could not be processed safely.",
        GuardError::Parse(_) => "The generated suggestions could not be read back reliably.",
        GuardError::Validation(_) | GuardError::Invocation(_) | GuardError::Fallback(_) => {
            "Suggestion generation is temporarily unavailable."
        }
    };
    format!("{lead} A simplified response is shown instead; please retry shortly.")
}

/// Run recovery without an injected model backend or cache.
///
/// Strategies that need a backend are skipped; the canned-template and
/// degradation strategies remain available. Endpoints that hold a
/// [`RecoveryOrchestrator`] should prefer [`RecoveryOrchestrator::recover`].
///
/// # Errors
///
/// Returns [`FallbackError`] when no configured strategy can produce a
/// response.
pub fn handle_idea_generation_fallback(
    error: &GuardError,
    user_input: &str,
    options: Option<&RecoveryOptions>,
) -> Result<String, FallbackError> {
    let defaults;
    let options = match options {
        Some(options) => options,
        None => {
            defaults = RecoveryOptions::default();
            &defaults
        }
    };

    let mut last_attempted = None;
    for &strategy in &options.strategies {
        last_attempted = Some(strategy);
        match strategy {
            FallbackStrategy::RetryWithSimplePrompt | FallbackStrategy::UseCachedResponse => {
                tracing::info!(
                    strategy = strategy.as_str(),
                    "strategy requires an injected backend, skipping"
                );
            }
            FallbackStrategy::ReturnTemplateResponse => {
                return Ok(canned_template_response(
                    crate::config::DEFAULT_LONG_INPUT_THRESHOLD,
                    user_input,
                ));
            }
            FallbackStrategy::GracefulDegradation => return Ok(degradation_message(error)),
        }
    }

    Err(FallbackError::new(
        last_attempted.unwrap_or(FallbackStrategy::ReturnTemplateResponse),
        error.to_string(),
    ))
}

/// Map an error to its logging severity.
///
/// Security violations are `High`; validation violations are `High`
/// only for the injection kind; parse-guard violations are `High` only
/// for the security-key kind; transient invocation failures are
/// `Medium`; anything else is `Low`.
#[must_use]
pub fn classify_error_severity(error: &GuardError) -> Severity {
    match error {
        GuardError::Security(_) => Severity::High,
        GuardError::Validation(violation) => {
            if violation.kind == ValidationViolationKind::PromptInjection {
                Severity::High
            } else {
                Severity::Medium
            }
        }
        GuardError::Parse(violation) => {
            if violation.kind == ParseGuardErrorKind::SecurityViolation {
                Severity::High
            } else {
                Severity::Low
            }
        }
        GuardError::Invocation(error) => {
            if matches!(
                error,
                InvocationError::Timeout { .. } | InvocationError::Network { .. }
            ) {
                Severity::Medium
            } else {
                Severity::Low
            }
        }
        GuardError::Fallback(_) => Severity::Low,
    }
}

/// Bounded, serializable error report safe to hand to a logger.
///
/// Carries derived metrics only, never the raw user payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error type name, e.g. `SecurityViolation`.
    pub name: String,
    /// Rendered message, truncated to 500 characters.
    pub message: String,
    /// Stable type tag: `security`, `validation`, `parse`,
    /// `invocation`, or `fallback`.
    pub error_type: String,
    /// Classified severity.
    pub severity: Severity,
    /// Closed-set violation kind, when the error carries one.
    pub violation_kind: Option<String>,
    /// Rendered source chain, truncated to 2000 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
    /// When the report was produced.
    pub timestamp: DateTime<Utc>,
}

/// Produce a bounded [`ErrorReport`] for logging.
///
/// With `include_chain` the report carries the rendered
/// `std::error::Error::source` chain, truncated to 2000 characters.
#[must_use]
pub fn sanitize_error_for_logging(error: &GuardError, include_chain: bool) -> ErrorReport {
    let name = match error {
        GuardError::Security(_) => "SecurityViolation",
        GuardError::Validation(_) => "ValidationViolation",
        GuardError::Parse(_) => "ParseGuardError",
        GuardError::Invocation(_) => "InvocationError",
        GuardError::Fallback(_) => "FallbackError",
    };

    let chain = include_chain.then(|| {
        let mut parts = Vec::new();
        let mut current: Option<&dyn std::error::Error> = Some(error);
        while let Some(err) = current {
            parts.push(err.to_string());
            current = err.source();
        }
        truncate_chars(&parts.join("\n  caused by: "), MAX_REPORT_CHAIN_CHARS)
    });

    ErrorReport {
        name: name.to_string(),
        message: truncate_chars(&error.to_string(), MAX_REPORT_MESSAGE_CHARS),
        error_type: error.type_tag().to_string(),
        severity: classify_error_severity(error),
        violation_kind: error.violation_kind().map(str::to_string),
        chain,
        timestamp: Utc::now(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
