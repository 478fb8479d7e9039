//! In-process [`WorkflowStore`] for tests and the `validate` command, with
//! switchable faults.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use steps::Variables;

use super::{StoreError, WorkflowStore};
use crate::models::{Continuation, ExecutionStatus, Workflow, WorkflowExecution, WorkflowStep};

#[derive(Default)]
struct Inner {
    workflows: HashMap<Uuid, Workflow>,
    /// Kept in insertion order, not sorted.
    steps: HashMap<Uuid, Vec<WorkflowStep>>,
    executions: HashMap<Uuid, WorkflowExecution>,
    resume_at: HashMap<Uuid, DateTime<Utc>>,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    workflow_queries: bool,
    insert_for: HashSet<Uuid>,
    finalize_for: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

fn injected(what: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {what} failure"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every workflow query fail as unavailable.
    pub async fn fail_workflow_queries(&self) {
        self.inner.write().await.faults.workflow_queries = true;
    }

    /// Make execution-record creation fail for runs of `workflow_id`.
    pub async fn fail_execution_insert(&self, workflow_id: Uuid) {
        self.inner.write().await.faults.insert_for.insert(workflow_id);
    }

    /// Make the terminal write fail for runs of `workflow_id`.
    pub async fn fail_finalize(&self, workflow_id: Uuid) {
        self.inner.write().await.faults.finalize_for.insert(workflow_id);
    }

    /// Swap a workflow's step list, as an authoring edit would.
    pub async fn replace_steps(&self, workflow_id: Uuid, steps: Vec<WorkflowStep>) {
        self.inner.write().await.steps.insert(workflow_id, steps);
    }

    /// Every execution of `workflow_id`, oldest first.
    pub async fn executions_for(&self, workflow_id: Uuid) -> Vec<WorkflowExecution> {
        let inner = self.inner.read().await;
        let mut found: Vec<_> = inner
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.started_at);
        found
    }
}

impl Inner {
    fn execution_mut(&mut self, id: Uuid) -> Result<&mut WorkflowExecution, StoreError> {
        self.executions
            .get_mut(&id)
            .ok_or(StoreError::Database(db::DbError::NotFound))
    }

    fn check_workflow_queries(&self) -> Result<(), StoreError> {
        if self.faults.workflow_queries {
            return Err(injected("workflow query"));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        steps: &[WorkflowStep],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.workflows.insert(workflow.id, workflow.clone());
        inner.steps.insert(workflow.id, steps.to_vec());
        Ok(())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, StoreError> {
        let inner = self.inner.read().await;
        inner.check_workflow_queries()?;
        let mut all: Vec<_> = inner.workflows.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_workflow(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let inner = self.inner.read().await;
        inner.check_workflow_queries()?;
        Ok(inner.workflows.get(&id).cloned())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<bool, StoreError> {
        // Steps and executions stay behind, matching the soft delete in Postgres.
        let mut inner = self.inner.write().await;
        Ok(inner.workflows.remove(&id).is_some())
    }

    async fn active_workflows(&self, trigger_type: &str) -> Result<Vec<Workflow>, StoreError> {
        let inner = self.inner.read().await;
        inner.check_workflow_queries()?;
        Ok(inner
            .workflows
            .values()
            .filter(|w| w.is_active && w.trigger_type == trigger_type)
            .cloned()
            .collect())
    }

    async fn steps(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let inner = self.inner.read().await;
        inner.check_workflow_queries()?;
        Ok(inner.steps.get(&workflow_id).cloned().unwrap_or_default())
    }

    async fn insert_execution(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.faults.insert_for.contains(&execution.workflow_id) {
            return Err(injected("execution insert"));
        }
        inner.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.inner.read().await.executions.get(&id).cloned())
    }

    async fn finalize_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        logs: &[String],
        variables: &Variables,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let workflow_id = inner.execution_mut(id)?.workflow_id;
        if inner.faults.finalize_for.contains(&workflow_id) {
            return Err(injected("finalize"));
        }
        inner.resume_at.remove(&id);

        let execution = inner.execution_mut(id)?;
        execution.status = status;
        execution.logs = logs.to_vec();
        execution.variables = variables.clone();
        execution.continuation = None;
        execution.completed_at = Some(completed_at);
        Ok(())
    }

    async fn suspend_execution(
        &self,
        id: Uuid,
        logs: &[String],
        variables: &Variables,
        continuation: &Continuation,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let execution = inner.execution_mut(id)?;
        execution.status = continuation.status();
        execution.logs = logs.to_vec();
        execution.variables = variables.clone();
        execution.continuation = Some(continuation.clone());

        match continuation.resume_at() {
            Some(at) => inner.resume_at.insert(id, at),
            None => inner.resume_at.remove(&id),
        };
        Ok(())
    }

    async fn claim_execution(
        &self,
        id: Uuid,
        from: ExecutionStatus,
    ) -> Result<Option<WorkflowExecution>, StoreError> {
        let mut inner = self.inner.write().await;
        let claimed = match inner.executions.get_mut(&id) {
            Some(execution) if execution.status == from => {
                execution.status = ExecutionStatus::Running;
                Some(execution.clone())
            }
            _ => None,
        };
        if claimed.is_some() {
            inner.resume_at.remove(&id);
        }
        Ok(claimed)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let mut inner = self.inner.write().await;

        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .resume_at
            .iter()
            .filter(|(id, at)| {
                **at <= now
                    && inner
                        .executions
                        .get(id)
                        .is_some_and(|e| e.status == ExecutionStatus::Waiting)
            })
            .map(|(id, at)| (*at, *id))
            .collect();
        due.sort();
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            inner.resume_at.remove(&id);
            let execution = inner.execution_mut(id)?;
            execution.status = ExecutionStatus::Running;
            claimed.push(execution.clone());
        }
        Ok(claimed)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.executions.get_mut(&id) {
            Some(execution) if execution.status == ExecutionStatus::Running => {
                execution.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .executions
            .get(&id)
            .is_some_and(|e| e.cancel_requested))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steps::Suspend;

    async fn waiting(store: &MemoryStore, resume_at: DateTime<Utc>) -> Uuid {
        let execution = WorkflowExecution::start(Uuid::new_v4(), json!({}));
        store.insert_execution(&execution).await.expect("insert");
        let continuation = Continuation {
            cursor: 1,
            wake: Suspend::Until { resume_at },
        };
        store
            .suspend_execution(execution.id, &[], &Variables::new(), &continuation)
            .await
            .expect("suspend");
        execution.id
    }

    #[tokio::test]
    async fn claim_due_takes_only_due_executions_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let due = waiting(&store, now - chrono::Duration::seconds(5)).await;
        let later = waiting(&store, now + chrono::Duration::hours(1)).await;

        let claimed = store.claim_due(now, 10).await.expect("claims");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due);
        assert_eq!(claimed[0].status, ExecutionStatus::Running);

        assert!(store.claim_due(now, 10).await.expect("claims").is_empty());
        let still_waiting = store.get_execution(later).await.expect("read").expect("exists");
        assert_eq!(still_waiting.status, ExecutionStatus::Waiting);
    }

    #[tokio::test]
    async fn claim_is_compare_and_set() {
        let store = MemoryStore::new();
        let id = waiting(&store, Utc::now()).await;

        assert!(store.claim_execution(id, ExecutionStatus::Waiting).await.expect("ok").is_some());
        assert!(store.claim_execution(id, ExecutionStatus::Waiting).await.expect("ok").is_none());
    }

    #[tokio::test]
    async fn cancel_flag_only_applies_to_running_executions() {
        let store = MemoryStore::new();
        let running = WorkflowExecution::start(Uuid::new_v4(), json!({}));
        store.insert_execution(&running).await.expect("insert");
        let parked = waiting(&store, Utc::now()).await;

        assert!(store.request_cancel(running.id).await.expect("ok"));
        assert!(store.cancel_requested(running.id).await.expect("ok"));
        assert!(!store.request_cancel(parked).await.expect("ok"));
    }
}
