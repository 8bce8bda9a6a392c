// SPDX-FileCopyrightText: 2026 Sqlnest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for sqlnest.

use thiserror::Error;

/// Result alias used throughout the sqlnest crates.
pub type Result<T> = std::result::Result<T, SqlnestError>;

/// The primary error type raised by the transaction scope manager and the
/// connection factory.
///
/// Failures raised by code running *inside* a scope are never wrapped in this
/// type; they travel through the caller's own error type and are returned
/// verbatim after rollback.
#[derive(Debug, Error)]
pub enum SqlnestError {
    /// The frame stack and the engine disagree about whether a transaction is
    /// open. Always fatal: indicates misuse of the connection (for example a
    /// raw `BEGIN` issued behind the manager's back) or a bug.
    #[error("transaction invariant violated during {operation}: {detail}")]
    InvariantViolation {
        operation: &'static str,
        detail: String,
    },

    /// The engine rejected or failed a statement. The underlying error is
    /// kept untouched so callers can inspect the SQLite error code.
    #[error("engine error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// The background connection thread of the async facade has shut down.
    #[error("database connection is closed")]
    ConnectionClosed,

    /// Filesystem failure while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid connection configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SqlnestError {
    /// Build an [`SqlnestError::InvariantViolation`] for the named operation.
    pub fn invariant(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            operation,
            detail: detail.into(),
        }
    }

    /// Returns `true` for [`SqlnestError::InvariantViolation`].
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Returns `true` when the engine itself reported the failure.
    #[must_use]
    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Returns the underlying SQLite error code, if this is an engine error
    /// carrying one.
    #[must_use]
    pub fn sqlite_error_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            Self::Engine(err) => err.sqlite_error_code(),
            _ => None,
        }
    }
}
