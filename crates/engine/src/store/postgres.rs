//! [`WorkflowStore`] on Postgres, via the `db` repository functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use db::models::{WorkflowExecutionRow, WorkflowRow, WorkflowStepRow};
use db::repository::{executions, steps as step_rows, workflows};
use db::{DbError, DbPool};
use steps::Variables;

use super::{StoreError, WorkflowStore};
use crate::models::{Continuation, ExecutionStatus, Workflow, WorkflowExecution, WorkflowStep};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row <-> model mapping
// ---------------------------------------------------------------------------

fn decode<T: DeserializeOwned>(
    what: &'static str,
    id: Uuid,
    value: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        what,
        id,
        message: e.to_string(),
    })
}

fn encode<T: Serialize>(
    what: &'static str,
    id: Uuid,
    value: &T,
) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
        what,
        id,
        message: e.to_string(),
    })
}

fn not_found_as_none<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(row) => Ok(Some(row)),
        Err(DbError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            trigger_type: row.trigger_type,
            trigger_config: row.trigger_config,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

impl From<&Workflow> for WorkflowRow {
    fn from(w: &Workflow) -> Self {
        Self {
            id: w.id,
            name: w.name.clone(),
            trigger_type: w.trigger_type.clone(),
            trigger_config: w.trigger_config.clone(),
            is_active: w.is_active,
            created_at: w.created_at,
        }
    }
}

impl From<WorkflowStepRow> for WorkflowStep {
    fn from(row: WorkflowStepRow) -> Self {
        Self {
            id: row.id,
            workflow_id: row.workflow_id,
            sort_order: row.sort_order,
            step_type: row.step_type,
            step_config: row.step_config,
        }
    }
}

impl From<&WorkflowStep> for WorkflowStepRow {
    fn from(s: &WorkflowStep) -> Self {
        Self {
            id: s.id,
            workflow_id: s.workflow_id,
            sort_order: s.sort_order,
            step_type: s.step_type.clone(),
            step_config: s.step_config.clone(),
        }
    }
}

impl TryFrom<WorkflowExecutionRow> for WorkflowExecution {
    type Error = StoreError;

    fn try_from(row: WorkflowExecutionRow) -> Result<Self, StoreError> {
        let status = row.status.parse::<ExecutionStatus>().map_err(|message| StoreError::Corrupt {
            what: "status",
            id: row.id,
            message,
        })?;
        let continuation = row
            .continuation
            .map(|c| decode::<Continuation>("continuation", row.id, c))
            .transpose()?;

        Ok(Self {
            id: row.id,
            workflow_id: row.workflow_id,
            status,
            logs: decode("logs", row.id, row.logs)?,
            variables: decode("variables", row.id, row.variables)?,
            trigger_data: row.trigger_data,
            continuation,
            cancel_requested: row.cancel_requested,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn execution_row(e: &WorkflowExecution) -> Result<WorkflowExecutionRow, StoreError> {
    Ok(WorkflowExecutionRow {
        id: e.id,
        workflow_id: e.workflow_id,
        status: e.status.to_string(),
        trigger_data: e.trigger_data.clone(),
        logs: encode("logs", e.id, &e.logs)?,
        variables: encode("variables", e.id, &e.variables)?,
        continuation: e
            .continuation
            .as_ref()
            .map(|c| encode("continuation", e.id, c))
            .transpose()?,
        resume_at: e.continuation.as_ref().and_then(Continuation::resume_at),
        cancel_requested: e.cancel_requested,
        started_at: e.started_at,
        completed_at: e.completed_at,
    })
}

// ---------------------------------------------------------------------------
// WorkflowStore
// ---------------------------------------------------------------------------

#[async_trait]
impl WorkflowStore for PgStore {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        steps: &[WorkflowStep],
    ) -> Result<(), StoreError> {
        let rows: Vec<WorkflowStepRow> = steps.iter().map(Into::into).collect();
        workflows::create_workflow(&self.pool, &WorkflowRow::from(workflow), &rows).await?;
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let rows = workflows::list_workflows(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        Ok(not_found_as_none(workflows::get_workflow(&self.pool, id).await)?.map(Into::into))
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(not_found_as_none(workflows::delete_workflow(&self.pool, id).await)?.is_some())
    }

    async fn active_workflows(&self, trigger_type: &str) -> Result<Vec<Workflow>, StoreError> {
        let rows = workflows::list_active_by_trigger(&self.pool, trigger_type).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let rows = step_rows::list_steps(&self.pool, workflow_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        executions::insert_execution(&self.pool, &execution_row(execution)?).await?;
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError> {
        not_found_as_none(executions::get_execution(&self.pool, id).await)?
            .map(WorkflowExecution::try_from)
            .transpose()
    }

    async fn finalize_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        logs: &[String],
        variables: &Variables,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        executions::finalize_execution(
            &self.pool,
            id,
            status.as_str(),
            &encode("logs", id, &logs)?,
            &encode("variables", id, variables)?,
            completed_at,
        )
        .await?;
        Ok(())
    }

    async fn suspend_execution(
        &self,
        id: Uuid,
        logs: &[String],
        variables: &Variables,
        continuation: &Continuation,
    ) -> Result<(), StoreError> {
        executions::suspend_execution(
            &self.pool,
            id,
            continuation.status().as_str(),
            &encode("logs", id, &logs)?,
            &encode("variables", id, variables)?,
            &encode("continuation", id, continuation)?,
            continuation.resume_at(),
        )
        .await?;
        Ok(())
    }

    async fn claim_execution(
        &self,
        id: Uuid,
        from: ExecutionStatus,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        executions::claim_execution(&self.pool, id, from.as_str())
            .await?
            .map(WorkflowExecution::try_from)
            .transpose()
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        executions::claim_due(&self.pool, now, i64::from(limit))
            .await?
            .into_iter()
            .map(WorkflowExecution::try_from)
            .collect()
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(executions::request_cancel(&self.pool, id).await?)
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(executions::cancel_requested(&self.pool, id).await?)
    }
}
