//! Execution Recorder: opens and closes the persisted run record.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use steps::Variables;

use crate::models::{Continuation, ExecutionLog, ExecutionStatus, WorkflowExecution};
use crate::store::{StoreError, WorkflowStore};

pub struct ExecutionRecorder {
    store: Arc<dyn WorkflowStore>,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Insert a `running` execution with empty logs.
    pub async fn create(
        &self,
        workflow_id: Uuid,
        trigger_data: Value,
    ) -> Result<WorkflowExecution, StoreError> {
        let execution = WorkflowExecution::start(workflow_id, trigger_data);
        self.store.insert_execution(&execution).await?;
        debug!(execution_id = %execution.id, workflow_id = %workflow_id, "execution opened");
        Ok(execution)
    }

    /// The single terminal write.
    pub async fn finalize(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        log: &ExecutionLog,
        variables: &Variables,
    ) -> Result<(), StoreError> {
        debug_assert!(status.is_terminal(), "finalize with non-terminal status {status}");
        self.store
            .finalize_execution(execution_id, status, log.lines(), variables, Utc::now())
            .await?;
        debug!(
            execution_id = %execution_id,
            status = %status,
            lines = log.len(),
            "execution closed"
        );
        Ok(())
    }

    /// Park the run until `continuation` wakes it.
    pub async fn suspend(
        &self,
        execution_id: Uuid,
        continuation: &Continuation,
        log: &ExecutionLog,
        variables: &Variables,
    ) -> Result<(), StoreError> {
        self.store
            .suspend_execution(execution_id, log.lines(), variables, continuation)
            .await?;
        debug!(
            execution_id = %execution_id,
            status = %continuation.status(),
            cursor = continuation.cursor,
            "execution suspended"
        );
        Ok(())
    }
}
