//! Durable workflow runtime.
//!
//! The engine provides the substrate the fulfillment sagas run on:
//!
//! - Workflow code is deterministic; all non-determinism (time, randomness,
//!   IO) happens inside activities invoked through the runtime.
//! - Every completed step — activity result, child workflow result, signal
//!   receipt, timer fire — is appended to a persisted journal keyed by run
//!   id. Re-running a run id replays journal entries positionally instead of
//!   re-executing side effects, so a crashed run resumes deterministically.
//! - Activities run under a bounded retry policy; non-retryable application
//!   errors bypass the budget.
//! - Signals are named FIFO mailboxes addressed by workflow id.
//! - Cancellation is cooperative and observed at every suspension point.

mod journal;
mod retry;
mod runtime;
mod signal;

pub use journal::{InMemoryJournalStore, JournalEntry, JournalStore, StepKind, StepOutcome};
pub use retry::RetryPolicy;
pub use runtime::{WorkflowCtx, WorkflowHandle, WorkflowRuntime};
pub use signal::SignalRouter;

use thiserror::Error;

/// Error returned by an activity implementation.
///
/// Retryable errors consume the retry budget; non-retryable ones fail the
/// step immediately (the "application error" of the workflow contract).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivityError {
    #[error("{message}")]
    NonRetryable { code: String, message: String },

    #[error("{message}")]
    Retryable { code: String, message: String },
}

impl ActivityError {
    pub fn non_retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::NonRetryable {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        ActivityError::Retryable {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ActivityError::NonRetryable { code, .. } | ActivityError::Retryable { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ActivityError::NonRetryable { message, .. }
            | ActivityError::Retryable { message, .. } => message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ActivityError::Retryable { .. })
    }
}

/// Terminal error of a workflow run.
///
/// `Display` is the bare failure message so callers and tests can match on
/// the original cause (for example `"worker unavailable"`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{message}")]
    ActivityFailed {
        activity: String,
        code: String,
        message: String,
        retryable: bool,
    },

    #[error("{message}")]
    Timeout { message: String },

    #[error("workflow cancelled")]
    Cancelled,

    #[error("{message}")]
    ApplicationFailure {
        code: String,
        message: String,
        retryable: bool,
    },

    #[error("workflow or activity {name} is not registered")]
    NotRegistered { name: String },

    #[error("workflow payload serialization failed: {message}")]
    Serialization { message: String },

    #[error("non-deterministic replay at step {index}: journal has {recorded}, code ran {actual}")]
    NonDeterministic {
        index: u32,
        recorded: String,
        actual: String,
    },
}

impl WorkflowError {
    /// Failure raised by workflow code itself (not an activity).
    pub fn application(code: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::ApplicationFailure {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        WorkflowError::Timeout {
            message: message.into(),
        }
    }

    /// The bare failure message, without step context.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the outer retry controller may re-run the whole workflow.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::ActivityFailed { retryable, .. }
            | WorkflowError::ApplicationFailure { retryable, .. } => *retryable,
            WorkflowError::Timeout { .. } => true,
            WorkflowError::Cancelled
            | WorkflowError::NotRegistered { .. }
            | WorkflowError::Serialization { .. }
            | WorkflowError::NonDeterministic { .. } => false,
        }
    }

    pub(crate) fn from_activity(activity: &str, err: ActivityError) -> Self {
        WorkflowError::ActivityFailed {
            activity: activity.to_string(),
            code: err.code().to_string(),
            message: err.message().to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization {
            message: err.to_string(),
        }
    }
}
