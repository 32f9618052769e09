//! Error types for the session layer.
//!
//! This module defines all error types using `thiserror`. Driver failures are
//! deliberately not translated: whatever sqlx reports surfaces to the caller
//! unmodified, wrapped only so the crate has a single error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Absent or unparseable connection string. Raised at construction,
    /// never retried.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// A malformed command handed to an execution helper (empty command
    /// text, invalid procedure name). Caller bug, fails fast.
    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    /// Transaction lifecycle misuse, e.g. committing with no active
    /// transaction.
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// An operation the selected backend cannot perform.
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// Any failure from the underlying driver: network, SQL syntax,
    /// constraint violation. Propagated as-is, no retry, no rewording.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid command error.
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Check whether this error originated in the underlying driver.
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// Check whether this error is a caller bug rather than an environment
    /// failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidCommand { .. } | Self::Transaction { .. })
    }
}

/// Result type alias for session operations.
pub type DbResult<T> = Result<T, DbError>;
