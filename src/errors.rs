//! Typed error hierarchy for the workflow core.
//!
//! Three business categories — `NotFound`, `Forbidden`, `BadState` — plus a
//! transparent storage variant. Business failures are detected before any
//! mutation and abort the whole transaction; each carries enough context
//! (current status, required phase) for the caller to explain the rejection
//! without a second round trip.

use thiserror::Error;

use crate::phases::Phase;

/// Why an actor is not allowed to act on an application right now.
#[derive(Debug, Error)]
pub enum ForbiddenReason {
    #[error("Actor identity missing")]
    MissingActor,

    #[error("Actor has no role")]
    MissingRole,

    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    #[error("Application is at phase '{current}', role is authorized for '{required}'")]
    WrongStage { current: Phase, required: Phase },
}

/// The application's stored state rules out any advance.
#[derive(Debug, Error)]
pub enum BadStateReason {
    #[error("Stored status '{0}' is not a recognized phase")]
    UnknownStatus(String),

    #[error("Application already at final phase")]
    AlreadyFinal,
}

/// Errors from the advance service and the application store.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Application {id} not found")]
    NotFound { id: String },

    #[error("Forbidden: {0}")]
    Forbidden(#[source] ForbiddenReason),

    #[error("Bad state: {0}")]
    BadState(#[source] BadStateReason),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn wrong_stage(current: Phase, required: Phase) -> Self {
        Self::Forbidden(ForbiddenReason::WrongStage { current, required })
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(anyhow::Error::new(e).context("Storage failure"))
    }
}
