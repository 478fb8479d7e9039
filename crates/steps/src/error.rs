//! Step-level error types.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by one of the systems a handler acts upon.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollaboratorError {
    /// The backing service could not be reached or refused the call.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The call did not complete within its bound.
    #[error("{service} timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }
}

/// Errors raised by a step, as opposed to a step that ran and reported
/// `success = false`.
///
/// Decode errors (`UnknownStepType`, `InvalidConfig`) come out of
/// [`StepRegistry::prepare`](crate::StepRegistry::prepare) before a run
/// starts; the others are raised while a handler executes and end up in the
/// execution log with an `ERROR` prefix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Invalid {step_type} config: {message}")]
    InvalidConfig { step_type: String, message: String },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("step handler panicked: {0}")]
    Panicked(String),
}
