//! idea-guard
//!
//! A defense pipeline guarding both directions of interaction with a
//! generative language model that turns user-supplied briefs into
//! structured suggestions.
//!
//! # Features
//!
//! - Input sanitization with multi-language injection detection
//! - Secure prompt construction with data-fence markers
//! - Model response validation and allow-list markup stripping
//! - Guarded JSON parsing (size, depth, dangerous keys)
//! - Ordered recovery strategies with bounded retries
//!
//! # Architecture
//!
//! ```text
//! user brief ──▶ sanitize ──▶ prompt ──▶ [model call] ──▶ validate ──▶ parse ──▶ result
//!                   │            │            │               │          │
//!                   └────────────┴────────────┴───────────────┴──────────┘
//!                                      failure routes to recovery
//! ```
//!
//! Correctness is provable from enumerable rules (pattern families,
//! size and depth limits) rather than from the model's own judgment,
//! and every rejection degrades into a safe, non-crashing user-visible
//! outcome.
//!
//! # Quick Start
//!
//! ```
//! use idea_guard::sanitize_prompt_input;
//!
//! let clean = sanitize_prompt_input("A brief about community treasuries.")?;
//! assert_eq!(clean, "A brief about community treasuries.");
//! # Ok::<(), idea_guard::SecurityViolation>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parse;
pub mod patterns;
pub mod pipeline;
pub mod prompt;
pub mod recovery;
pub mod sanitize;
pub mod traits;
pub mod validate;

pub use config::GuardConfig;
pub use error::{
    FallbackError, GuardError, InvocationError, ParseGuardError, ParseGuardErrorKind,
    SecurityViolation, SecurityViolationKind, Severity, ValidationViolation,
    ValidationViolationKind,
};
pub use parse::{safe_json_parse, safe_json_parse_with_fallback, ParseOptions};
pub use pipeline::{GenerationPipeline, PipelineOutcome, PipelineState, StructuredOutcome};
pub use prompt::{build_secure_prompt, SecurePromptBuilder};
pub use recovery::{
    classify_error_severity, content_hash, handle_idea_generation_fallback,
    sanitize_error_for_logging, ErrorReport, FallbackStrategy, RecoveryOptions,
    RecoveryOrchestrator,
};
pub use sanitize::{sanitize_prompt_input, InputSanitizer};
pub use traits::{ModelInvoker, NoopCache, ResponseCache};
pub use validate::{validate_llm_response, ResponseValidator};
