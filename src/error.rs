//! Error types for nodewatch.
//!
//! All errors are strongly typed using thiserror, layered the same way
//! throughout the crate: definition problems are `ValidationError`s, log
//! source problems are `SourceError`s, worker and channel problems are
//! `ExecutionError`s, and `WatchError` wraps them all.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating rule definitions and extractor patterns.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Rule name cannot be empty")]
    EmptyRuleName,

    #[error("Rule '{rule}' has an empty {field}")]
    EmptyNode {
        rule: String,
        field: String,
    },

    #[error("Rule '{rule}' must define at least one step")]
    NoSteps {
        rule: String,
    },

    #[error("Rule '{rule}' step {step} has a zero timeout")]
    ZeroTimeout {
        rule: String,
        step: usize,
    },

    #[error("Rule '{name}' is already defined")]
    DuplicateRule {
        name: String,
    },

    #[error("Invalid node pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Malformed rule at line {line}: {reason}")]
    MalformedRule {
        line: usize,
        reason: String,
    },
}

/// Errors raised by the log source reader.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Log source not found: {}", path.display())]
    NotFound {
        path: PathBuf,
    },

    #[error("Failed to open log source {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read log source {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the monitor worker and its channels.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Failed to spawn thread '{name}': {message}")]
    SpawnFailed {
        name: String,
        message: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for nodewatch.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl WatchError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a log source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if the failing operation may succeed on a later poll.
    ///
    /// Only mid-poll read failures qualify; a missing source at startup is fatal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Source(SourceError::Read { .. }))
    }
}

/// Result type alias for nodewatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
