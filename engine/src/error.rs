//! Uniform error surface for callers of the engine.
//!
//! Module-level errors stay as their own `thiserror` enums; at the service
//! boundary they are folded into `EngineError`, which carries the kind, a
//! stable machine-readable code, a human message and the retryability flag.
//!
//! Kinds:
//! - `Validation`: bad input or invariant violation at command time; never retried
//! - `NotFound`: targeted entity absent
//! - `Conflict`: invalid transition, duplicate resource, capacity exceeded
//! - `Transient`: storage/network/worker unavailability; retried at the nearest boundary
//! - `Compensable`: downstream failure after resources were reserved
//! - `Fatal`: programmer error; crashes the current unit of work

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transient,
    Compensable,
    Fatal,
}

impl ErrorKind {
    /// Only transient failures are eligible for automatic retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Structured error returned by synchronous commands.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl EngineError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, code, message)
    }

    pub fn compensable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compensable, code, message)
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, code, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(EngineError::transient("storage_unavailable", "timeout").retryable);
        assert!(!EngineError::validation("empty_items", "order has no items").retryable);
        assert!(!EngineError::conflict("already_waved", "order already assigned").retryable);
        assert!(!EngineError::fatal("unknown_enum", "unhandled variant").retryable);
    }
}
