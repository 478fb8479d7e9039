//! The workflow/step/execution store.
//!
//! The store is the only resource shared between concurrent runs. Each run
//! writes only its own execution record; suspended records are claimed with
//! a compare-and-set so a resume, an approval and a cancel can never all
//! take the same execution.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use steps::Variables;

use crate::models::{Continuation, ExecutionStatus, Workflow, WorkflowExecution, WorkflowStep};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] db::DbError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value does not decode into its domain type.
    #[error("corrupt {what} in {id}: {message}")]
    Corrupt {
        what: &'static str,
        id: Uuid,
        message: String,
    },
}

impl From<db::DbError> for StoreError {
    fn from(err: db::DbError) -> Self {
        if err.is_unreachable() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ------ Authoring ------

    /// Store a workflow and its steps atomically.
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        steps: &[WorkflowStep],
    ) -> Result<(), StoreError>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError>;

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError>;

    /// Returns `false` when no such workflow existed.
    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError>;

    // ------ Dispatch reads ------

    /// Active workflows with this `trigger_type`, in no particular order.
    async fn active_workflows(&self, trigger_type: &str) -> Result<Vec<Workflow>, StoreError>;

    /// The workflow's steps. Implementations need not order them.
    async fn steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError>;

    // ------ Executions ------

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError>;

    /// The terminal write. Clears any continuation.
    async fn finalize_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        logs: &[String],
        variables: &Variables,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Park a run on `continuation`, recording `continuation.status()`.
    async fn suspend_execution(
        &self,
        id: Uuid,
        logs: &[String],
        variables: &Variables,
        continuation: &Continuation,
    ) -> Result<(), StoreError>;

    /// Compare-and-set from `from` to `running`. `None` when the execution is
    /// not in `from`.
    async fn claim_execution(
        &self,
        id: Uuid,
        from: ExecutionStatus,
    ) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Claim up to `limit` `waiting` executions due at `now`, oldest first.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;

    /// Flag a `running` execution for cooperative cancellation. Returns
    /// `false` when it is not running.
    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, StoreError>;
}
