//! The generation pipeline: one guarded model invocation.
//!
//! [`GenerationPipeline`] threads the defense stages together:
//! sanitize → build prompt → invoke (the single I/O-bound call, under a
//! timeout) → validate → optionally parse. Any stage failure routes to
//! the [`RecoveryOrchestrator`]; recovery success still produces a
//! usable outcome, recovery exhaustion fails the run.
//!
//! Runs are stateless; the only shared data is the immutable pattern
//! tables, so concurrent runs need no coordination.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::parse::{safe_json_parse, ParseOptions};
use crate::prompt::SecurePromptBuilder;
use crate::recovery::{RecoveryOptions, RecoveryOrchestrator};
use crate::sanitize::{normalize_whitespace, InputSanitizer};
use crate::traits::{invoke_with_timeout, ModelInvoker, ResponseCache};
use crate::validate::ResponseValidator;

/// State of one pipeline run.
///
/// `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Checking the raw user input.
    Sanitizing,
    /// Building the secure prompt.
    Prompting,
    /// Waiting on the injected model call.
    Invoking,
    /// Checking the model response.
    Validating,
    /// Running fallback strategies after a stage failure.
    Recovering,
    /// A result was produced.
    Done,
    /// Recovery was exhausted.
    Failed,
}

impl PipelineState {
    /// Returns the state name as a stable string for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sanitizing => "sanitizing",
            Self::Prompting => "prompting",
            Self::Invoking => "invoking",
            Self::Validating => "validating",
            Self::Recovering => "recovering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Sanitizing, Self::Prompting | Self::Recovering)
                | (Self::Prompting, Self::Invoking | Self::Recovering)
                | (Self::Invoking, Self::Validating | Self::Recovering)
                | (Self::Validating, Self::Done | Self::Recovering)
                | (Self::Recovering, Self::Done | Self::Failed)
        )
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// The validated (or recovered) response text.
    pub content: String,
    /// True when the content came from a recovery strategy rather than
    /// the primary path.
    pub recovered: bool,
    /// Identifier correlating the run's log events.
    pub run_id: Uuid,
}

/// Result of a successful structured pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredOutcome {
    /// The parsed response value; a recovered canned response is
    /// wrapped as a JSON string.
    pub value: Value,
    /// True when the value came from a recovery strategy.
    pub recovered: bool,
    /// Identifier correlating the run's log events.
    pub run_id: Uuid,
}

/// Selects a model backend (via the injected [`ModelInvoker`]) and runs
/// the guarded generation pipeline around the one I/O-bound call.
pub struct GenerationPipeline {
    invoker: Arc<dyn ModelInvoker>,
    config: GuardConfig,
    sanitizer: InputSanitizer,
    builder: SecurePromptBuilder,
    validator: ResponseValidator,
    recovery: RecoveryOrchestrator,
    recovery_options: RecoveryOptions,
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("config", &self.config)
            .field("recovery_options", &self.recovery_options)
            .finish_non_exhaustive()
    }
}

impl GenerationPipeline {
    /// Create a pipeline with default configuration.
    #[must_use]
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self::with_config(invoker, GuardConfig::default())
    }

    /// Create a pipeline with explicit configuration.
    #[must_use]
    pub fn with_config(invoker: Arc<dyn ModelInvoker>, config: GuardConfig) -> Self {
        let sanitizer = InputSanitizer::with_config(&config);
        let recovery = RecoveryOrchestrator::with_config(Arc::clone(&invoker), config.clone());
        Self {
            sanitizer: sanitizer.clone(),
            builder: SecurePromptBuilder::with_sanitizer(sanitizer),
            validator: ResponseValidator::with_config(&config),
            recovery,
            recovery_options: RecoveryOptions::default(),
            invoker,
            config,
        }
    }

    /// Attach a response cache for recovery lookups.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.recovery = self.recovery.with_cache(cache);
        self
    }

    /// Override the recovery options.
    #[must_use]
    pub fn with_recovery_options(mut self, options: RecoveryOptions) -> Self {
        self.recovery_options = options;
        self
    }

    /// Run the pipeline for free-form output.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Fallback`] when the primary path failed and
    /// recovery was exhausted.
    pub async fn run(
        &self,
        template: &str,
        user_input: &str,
    ) -> Result<PipelineOutcome, GuardError> {
        let run_id = Uuid::new_v4();
        let mut state = PipelineState::Sanitizing;
        tracing::debug!(
            run_id = %run_id,
            state = state.as_str(),
            input_length = user_input.trim().chars().count(),
            "pipeline run started"
        );

        match self.generate_once(template, user_input, run_id, &mut state).await {
            Ok(content) => {
                transition(run_id, &mut state, PipelineState::Done);
                Ok(PipelineOutcome {
                    content,
                    recovered: false,
                    run_id,
                })
            }
            Err(error) => {
                let content = self
                    .recover_content(error, user_input, run_id, &mut state)
                    .await?;
                Ok(PipelineOutcome {
                    content,
                    recovered: true,
                    run_id,
                })
            }
        }
    }

    /// Run the pipeline when structured output is expected.
    ///
    /// The validated response additionally passes through the parse
    /// guard; a recovered canned response is wrapped as a JSON string
    /// with `recovered` set.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Fallback`] when the primary path failed and
    /// recovery was exhausted.
    pub async fn run_structured(
        &self,
        template: &str,
        user_input: &str,
        parse_options: &ParseOptions,
    ) -> Result<StructuredOutcome, GuardError> {
        let run_id = Uuid::new_v4();
        let mut state = PipelineState::Sanitizing;
        tracing::debug!(
            run_id = %run_id,
            state = state.as_str(),
            input_length = user_input.trim().chars().count(),
            "structured pipeline run started"
        );

        let attempt = match self.generate_once(template, user_input, run_id, &mut state).await {
            Ok(validated) => safe_json_parse(&validated, parse_options).map_err(GuardError::from),
            Err(error) => Err(error),
        };

        match attempt {
            Ok(value) => {
                transition(run_id, &mut state, PipelineState::Done);
                Ok(StructuredOutcome {
                    value,
                    recovered: false,
                    run_id,
                })
            }
            Err(error) => {
                let content = self
                    .recover_content(error, user_input, run_id, &mut state)
                    .await?;
                Ok(StructuredOutcome {
                    value: Value::String(content),
                    recovered: true,
                    run_id,
                })
            }
        }
    }

    /// The primary path: sanitize, prompt, invoke, validate.
    async fn generate_once(
        &self,
        template: &str,
        user_input: &str,
        run_id: Uuid,
        state: &mut PipelineState,
    ) -> Result<String, GuardError> {
        let cleaned = match self.sanitizer.sanitize(user_input) {
            Ok(text) => text,
            Err(violation) if violation.is_delimiter_only() => {
                // The builder escapes the delimiters; rejection here
                // would bypass its leniency.
                normalize_whitespace(user_input)
            }
            Err(violation) => return Err(violation.into()),
        };

        transition(run_id, state, PipelineState::Prompting);
        let prompt = self.builder.build(template, &cleaned)?;

        transition(run_id, state, PipelineState::Invoking);
        let response =
            invoke_with_timeout(&*self.invoker, &prompt, self.config.invoke_timeout_ms).await?;

        transition(run_id, state, PipelineState::Validating);
        let validated = self.validator.validate(&response)?;
        Ok(validated)
    }

    async fn recover_content(
        &self,
        error: GuardError,
        user_input: &str,
        run_id: Uuid,
        state: &mut PipelineState,
    ) -> Result<String, GuardError> {
        transition(run_id, state, PipelineState::Recovering);
        match self
            .recovery
            .recover(&error, user_input, &self.recovery_options)
            .await
        {
            Ok(content) => {
                transition(run_id, state, PipelineState::Done);
                Ok(content)
            }
            Err(fallback) => {
                transition(run_id, state, PipelineState::Failed);
                Err(GuardError::Fallback(fallback))
            }
        }
    }
}

fn transition(run_id: Uuid, state: &mut PipelineState, next: PipelineState) {
    tracing::debug!(
        run_id = %run_id,
        from = state.as_str(),
        to = next.as_str(),
        legal = state.can_transition_to(next),
        "pipeline state"
    );
    *state = next;
}
