//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use steps::StepError;

use crate::models::ExecutionStatus;
use crate::store::StoreError;

/// Errors produced by the workflow engine (validation + orchestration).
///
/// Step failures are not errors at this level: they end the run `failed`
/// and show up in its log.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two steps of one workflow share a `sort_order`.
    #[error("duplicate sort_order {0}")]
    DuplicateSortOrder(i32),

    /// A step's type is unknown or its config does not decode.
    #[error("step {sort_order}: {source}")]
    InvalidStep {
        sort_order: i32,
        #[source]
        source: StepError,
    },

    // ------ Dispatch / lifecycle errors ------

    /// The workflow store could not be queried before any run started.
    #[error("workflow store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    /// The execution is not in a state that accepts the request.
    #[error("execution {id} is {status}, expected {expected}")]
    InvalidState {
        id: Uuid,
        status: ExecutionStatus,
        expected: &'static str,
    },

    #[error("{approver} may not decide execution {id}")]
    ApproverNotAllowed { id: Uuid, approver: String },

    /// Persistence error outside of dispatch.
    #[error(transparent)]
    Store(#[from] StoreError),
}
