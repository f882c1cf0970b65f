//! Error types and exit codes for vybes
//!
//! Exit codes:
//! - 0: Success (at least one run in the batch passed)
//! - 1: Failure (no run passed, or a fatal error such as a missing table)
//! - 2: Usage error (bad flags/args)

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the vybes binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Success (0)
    Success = 0,
    /// Generic failure (1)
    Failure = 1,
    /// Usage error - bad flags/args (2)
    Usage = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

/// The namespace a looked-up name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Evaluation,
    AgentConfiguration,
    Command,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Evaluation => write!(f, "evaluation"),
            NameKind::AgentConfiguration => write!(f, "configuration"),
            NameKind::Command => write!(f, "command"),
        }
    }
}

/// Errors that can occur while preparing, running or persisting evaluations
#[derive(Error, Debug)]
pub enum VybesError {
    // Usage errors (exit code 2)
    #[error("{0}")]
    UsageError(String),

    // Data/config errors
    #[error("{kind} not found: {name}. Available: {available}")]
    UnknownName {
        kind: NameKind,
        name: String,
        available: String,
    },

    #[error("invalid configuration in {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    // Generic failures (exit code 1)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to {operation}: {reason}")]
    FailedOperation { operation: String, reason: String },

    #[error("failed to {operation} {target}: {reason}")]
    FailedOperationWithTarget {
        operation: String,
        target: String,
        reason: String,
    },
}

impl VybesError {
    /// Create an error for a name missing from one of the registries
    pub fn unknown_name<I, S>(kind: NameKind, name: &str, available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let available: Vec<String> = available
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        VybesError::UnknownName {
            kind,
            name: name.to_string(),
            available: available.join(", "),
        }
    }

    /// Create an error for an unreadable or invalid declarative table
    pub fn config(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        VybesError::Config {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an error for a failed IO operation with context
    pub fn io_operation(
        operation: &str,
        path: impl fmt::Display,
        error: impl fmt::Display,
    ) -> Self {
        VybesError::FailedOperationWithTarget {
            operation: operation.to_string(),
            target: path.to_string(),
            reason: error.to_string(),
        }
    }

    /// Create an error for a failed operation without a specific target
    pub fn failed(operation: &str, error: impl fmt::Display) -> Self {
        VybesError::FailedOperation {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }

    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            VybesError::UsageError(_) => ExitCode::Usage,

            VybesError::UnknownName { .. }
            | VybesError::Config { .. }
            | VybesError::Io(_)
            | VybesError::Json(_)
            | VybesError::Toml(_)
            | VybesError::FailedOperation { .. }
            | VybesError::FailedOperationWithTarget { .. } => ExitCode::Failure,
        }
    }

    /// Stable identifier used in structured log fields
    pub fn error_type(&self) -> &'static str {
        match self {
            VybesError::UsageError(_) => "usage_error",
            VybesError::UnknownName { .. } => "unknown_name",
            VybesError::Config { .. } => "config_error",
            VybesError::Io(_) => "io_error",
            VybesError::Json(_) => "json_error",
            VybesError::Toml(_) => "toml_error",
            VybesError::FailedOperation { .. } => "failed_operation",
            VybesError::FailedOperationWithTarget { .. } => "failed_operation_with_target",
        }
    }
}

/// Result type alias for vybes operations
pub type Result<T> = std::result::Result<T, VybesError>;
