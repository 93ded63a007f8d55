//! Unified error type for the rename engine.
//!
//! Each subsystem (frontend, proposer, renamer, LLM transport) has its own
//! error enum close to where the failures happen. Before anything reaches the
//! CLI or a caller of the engine entry point, those are bridged into
//! [`RenamebotError`] via `From` impls living in the crates that own the
//! source types.
//!
//! ## Exit Code Mapping
//!
//! - `2`: invalid arguments or API misuse (invariant violations)
//! - `3`: the input package could not be loaded (parse / type-check)
//! - `4`: the batch could not be applied (resolution, I/O)
//! - `5`: the LLM conversation failed or replied out of protocol
//! - `10`: internal errors (bugs, unexpected state)

use std::fmt;

use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Stable exit codes for the CLI surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Invalid arguments or API misuse.
    InvalidArguments = 2,
    /// The input package could not be loaded.
    LoadError = 3,
    /// The rename batch could not be applied.
    ApplyError = 4,
    /// LLM transport or protocol failure.
    LlmError = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl ExitCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the engine entry point and CLI output.
#[derive(Debug, Error)]
pub enum RenamebotError {
    /// API misuse (e.g. a non-test pass requested on a test-only package).
    #[error("invariant violation: {message}")]
    Invariant { message: String },

    /// A source file could not be parsed.
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// The package could not be type-checked.
    #[error("type check error: {message}")]
    TypeCheck { message: String },

    /// The LLM provider failed.
    #[error("llm error{}: {message}", retry_suffix(*.retryable))]
    Llm { message: String, retryable: bool },

    /// The assistant reply did not match the expected JSON protocol.
    #[error("protocol error for {file}: {message}")]
    Protocol { file: String, message: String },

    /// The rename batch failed systemically (not a per-directive failure).
    #[error("apply error: {message}")]
    Apply { message: String },

    /// A source file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn retry_suffix(retryable: bool) -> &'static str {
    if retryable {
        " (retryable)"
    } else {
        ""
    }
}

impl RenamebotError {
    /// Create an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        RenamebotError::Invariant {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        RenamebotError::Internal {
            message: message.into(),
        }
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RenamebotError::Invariant { .. } => ExitCode::InvalidArguments,
            RenamebotError::Parse { .. } => ExitCode::LoadError,
            RenamebotError::TypeCheck { .. } => ExitCode::LoadError,
            RenamebotError::Llm { .. } => ExitCode::LlmError,
            RenamebotError::Protocol { .. } => ExitCode::LlmError,
            RenamebotError::Apply { .. } => ExitCode::ApplyError,
            RenamebotError::Io(_) => ExitCode::ApplyError,
            RenamebotError::Internal { .. } => ExitCode::InternalError,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
