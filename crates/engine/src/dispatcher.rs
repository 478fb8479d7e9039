//! Trigger Matcher and run lifecycle.
//!
//! `WorkflowEngine` is the central orchestrator:
//! 1. Selects the active workflows whose `trigger_type` matches an event.
//! 2. Runs each one in its own task, so one workflow's failure (or panic)
//!    never touches another's run or record.
//! 3. Per run: opens the execution record, loads the steps, hands them to
//!    the [`StepRunner`], and closes (or parks) the record.
//! 4. Re-enters suspended runs: timed waits via [`WorkflowEngine::resume`],
//!    approvals via [`WorkflowEngine::decide`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use steps::{ExecutionContext, StepRegistry, Suspend};

use crate::config::EngineConfig;
use crate::loader::{validate_steps, StepLoader};
use crate::models::{
    Continuation, ExecutionLog, ExecutionStatus, Workflow, WorkflowDefinition, WorkflowExecution,
    WorkflowStep,
};
use crate::recorder::ExecutionRecorder;
use crate::runner::{RunOutcome, StepRunner};
use crate::store::{StoreError, WorkflowStore};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one workflow's run, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRunResult {
    pub workflow_id: Uuid,
    pub workflow_name: String,
    /// `None` when the execution record could not be created.
    pub execution_id: Option<Uuid>,
    /// `true` for completed runs and runs parked waiting.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    /// Something went wrong outside the steps (record creation, finalize).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowRunResult {
    fn new(
        workflow_id: Uuid,
        workflow_name: impl Into<String>,
        execution_id: Option<Uuid>,
    ) -> Self {
        Self {
            workflow_id,
            workflow_name: workflow_name.into(),
            execution_id,
            success: false,
            status: None,
            error: None,
        }
    }

    fn not_started(workflow_id: Uuid, workflow_name: impl Into<String>, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(workflow_id, workflow_name, None)
        }
    }

    fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.success = matches!(
            status,
            ExecutionStatus::Completed | ExecutionStatus::Waiting | ExecutionStatus::WaitingApproval
        );
        self.status = Some(status);
        self
    }
}

/// Aggregate result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchSummary {
    pub event_type: String,
    pub workflows_triggered: usize,
    pub results: Vec<WorkflowRunResult>,
}

/// A human decision on a run parked in `waiting_approval`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub approver: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A claimed execution rebuilt into a live run.
struct Reopened {
    result: WorkflowRunResult,
    ctx: ExecutionContext,
    log: ExecutionLog,
    cursor: i32,
}

const CANCEL_ATTEMPTS: usize = 3;

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    registry: StepRegistry,
    config: EngineConfig,
    loader: StepLoader,
    recorder: ExecutionRecorder,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: StepRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            loader: StepLoader::new(Arc::clone(&store)),
            recorder: ExecutionRecorder::new(Arc::clone(&store)),
            store,
            registry,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run every active workflow whose `trigger_type` is `event_type`.
    ///
    /// # Errors
    /// Only [`EngineError::StoreUnavailable`], when the matching query itself
    /// fails. Nothing has run and no record exists in that case. Everything
    /// that goes wrong afterwards is reported per workflow.
    #[instrument(skip(self, event_data), fields(event_type = %event_type))]
    pub async fn dispatch(
        self: &Arc<Self>,
        event_type: &str,
        event_data: Value,
    ) -> Result<DispatchSummary, EngineError> {
        let workflows = self
            .store
            .active_workflows(event_type)
            .await
            .map_err(EngineError::StoreUnavailable)?;

        info!("event matched {} workflow(s)", workflows.len());

        let handles: Vec<_> = workflows
            .into_iter()
            .map(|workflow| {
                let engine = Arc::clone(self);
                let trigger_data = event_data.clone();
                let meta = (workflow.id, workflow.name.clone());
                let handle = tokio::spawn(async move {
                    engine.execute_workflow(&workflow, trigger_data).await
                });
                (meta, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for ((workflow_id, workflow_name), handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    error!(
                        workflow_id = %workflow_id,
                        error = %join_error,
                        "workflow task aborted"
                    );
                    results.push(WorkflowRunResult::not_started(
                        workflow_id,
                        workflow_name,
                        format!("workflow task aborted: {join_error}"),
                    ));
                }
            }
        }

        Ok(DispatchSummary {
            event_type: event_type.to_string(),
            workflows_triggered: results.len(),
            results,
        })
    }

    /// One run of `workflow` for one event. Never fails: every problem ends
    /// up in the returned result or the execution's log.
    #[instrument(
        skip(self, workflow, trigger_data),
        fields(workflow_id = %workflow.id, workflow = %workflow.name)
    )]
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
        trigger_data: Value,
    ) -> WorkflowRunResult {
        let execution = match self.recorder.create(workflow.id, trigger_data).await {
            Ok(execution) => execution,
            Err(err) => {
                error!(error = %err, "could not open execution record, skipping workflow");
                return WorkflowRunResult::not_started(
                    workflow.id,
                    workflow.name.clone(),
                    format!("failed to create execution record: {err}"),
                );
            }
        };

        info!(execution_id = %execution.id, "execution started");
        let result = WorkflowRunResult::new(workflow.id, workflow.name.clone(), Some(execution.id));
        let ctx = ExecutionContext::new(workflow.id, execution.id, execution.trigger_data);
        self.drive(result, ctx, ExecutionLog::new(), None).await
    }

    // -----------------------------------------------------------------------
    // Re-entry
    // -----------------------------------------------------------------------

    /// Continue a timed-wait execution that has already been claimed
    /// (status `running`).
    #[instrument(skip(self, execution), fields(execution_id = %execution.id))]
    pub async fn resume(&self, execution: WorkflowExecution) -> WorkflowRunResult {
        match self.reopen(execution).await {
            Ok(mut run) => {
                run.log.note(format!("Resumed after step {}", run.cursor));
                self.drive(run.result, run.ctx, run.log, Some(run.cursor)).await
            }
            Err(closed) => closed,
        }
    }

    /// Record a human decision on a `waiting_approval` execution.
    ///
    /// Approval continues the run after the approval step; rejection ends it
    /// `failed`.
    #[instrument(skip(self, decision), fields(execution_id = %id, approver = %decision.approver))]
    pub async fn decide(
        &self,
        id: Uuid,
        decision: ApprovalDecision,
    ) -> Result<WorkflowRunResult, EngineError> {
        let execution = self.get_execution(id).await?;
        if execution.status != ExecutionStatus::WaitingApproval {
            return Err(EngineError::InvalidState {
                id,
                status: execution.status,
                expected: "waiting_approval",
            });
        }

        let approvers = match &execution.continuation {
            Some(Continuation {
                wake: Suspend::Approval { approvers, .. },
                ..
            }) => approvers,
            _ => {
                return Err(StoreError::Corrupt {
                    what: "continuation",
                    id,
                    message: "waiting_approval without an approval continuation".into(),
                }
                .into())
            }
        };
        if !approvers.is_empty() && !approvers.contains(&decision.approver) {
            return Err(EngineError::ApproverNotAllowed {
                id,
                approver: decision.approver,
            });
        }

        let Some(claimed) = self
            .store
            .claim_execution(id, ExecutionStatus::WaitingApproval)
            .await?
        else {
            // Someone else decided (or cancelled) first.
            let current = self.get_execution(id).await?;
            return Err(EngineError::InvalidState {
                id,
                status: current.status,
                expected: "waiting_approval",
            });
        };

        let mut run = match self.reopen(claimed).await {
            Ok(run) => run,
            Err(closed) => return Ok(closed),
        };

        let verdict = if decision.approved { "Approved" } else { "Rejected" };
        match &decision.comment {
            Some(comment) => run.log.note(format!("{verdict} by {}: {comment}", decision.approver)),
            None => run.log.note(format!("{verdict} by {}", decision.approver)),
        }
        run.ctx.variables.insert(
            "approval".into(),
            json!({
                "approved": decision.approved,
                "approver": decision.approver,
                "comment": decision.comment,
            }),
        );

        info!(approved = decision.approved, "approval decision recorded");
        if decision.approved {
            Ok(self.drive(run.result, run.ctx, run.log, Some(run.cursor)).await)
        } else {
            Ok(self.close(run.result, run.ctx, run.log, ExecutionStatus::Failed).await)
        }
    }

    /// Cancel an execution.
    ///
    /// A suspended run is finalized `cancelled` at once. A running one is
    /// flagged and stops before its next step. Returns the execution as it
    /// stands afterwards.
    #[instrument(skip(self), fields(execution_id = %id))]
    pub async fn cancel(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let mut status = ExecutionStatus::Running;

        // The status can move under us (a run finishing, a scheduler claim);
        // re-read and retry a few times before giving up.
        for _ in 0..CANCEL_ATTEMPTS {
            let execution = self.get_execution(id).await?;
            status = execution.status;

            if status == ExecutionStatus::Running {
                if self.store.request_cancel(id).await? {
                    info!("cancellation requested");
                    return self.get_execution(id).await;
                }
                continue;
            }

            if !status.is_suspended() {
                break;
            }

            if let Some(claimed) = self.store.claim_execution(id, status).await? {
                let mut log = ExecutionLog::from(claimed.logs);
                log.note("Execution cancelled");
                self.recorder
                    .finalize(id, ExecutionStatus::Cancelled, &log, &claimed.variables)
                    .await?;
                info!("suspended execution cancelled");
                return self.get_execution(id).await;
            }
        }

        Err(EngineError::InvalidState {
            id,
            status,
            expected: "running, waiting or waiting_approval",
        })
    }

    // -----------------------------------------------------------------------
    // Reads and authoring
    // -----------------------------------------------------------------------

    pub async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        self.store
            .get_execution(id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(id))
    }

    /// Validate and store a new workflow.
    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(Workflow, Vec<WorkflowStep>), EngineError> {
        let (workflow, mut steps) = definition.into_parts();
        validate_steps(&steps, &self.registry)?;
        steps.sort_by_key(|s| s.sort_order);

        self.store.create_workflow(&workflow, &steps).await?;
        info!(workflow_id = %workflow.id, steps = steps.len(), "workflow created");
        Ok((workflow, steps))
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, EngineError> {
        Ok(self.store.list_workflows().await?)
    }

    /// A workflow and its steps in execution order.
    pub async fn get_workflow(
        &self,
        id: Uuid,
    ) -> Result<(Workflow, Vec<WorkflowStep>), EngineError> {
        let workflow = self
            .store
            .get_workflow(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))?;
        let steps = self.loader.load(id).await?;
        Ok((workflow, steps))
    }

    pub async fn delete_workflow(&self, id: Uuid) -> Result<(), EngineError> {
        if !self.store.delete_workflow(id).await? {
            return Err(EngineError::WorkflowNotFound(id));
        }
        info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal: one run segment and the writes that end it.
    // -----------------------------------------------------------------------

    /// Load the steps fresh and run those ordered after `after`.
    async fn drive(
        &self,
        result: WorkflowRunResult,
        mut ctx: ExecutionContext,
        mut log: ExecutionLog,
        after: Option<i32>,
    ) -> WorkflowRunResult {
        let steps = match self.loader.load(ctx.workflow_id).await {
            Ok(steps) => steps,
            Err(err) => {
                log.note(format!("ERROR: could not load steps: {err}"));
                return self.close(result, ctx, log, ExecutionStatus::Failed).await;
            }
        };

        let pending: Vec<WorkflowStep> = steps
            .into_iter()
            .filter(|s| after.map_or(true, |cursor| s.sort_order > cursor))
            .collect();

        let runner =
            StepRunner::new(&self.registry, self.store.as_ref(), self.config.max_run_duration);
        match runner.run(&pending, &mut ctx, &mut log).await {
            RunOutcome::Completed => self.close(result, ctx, log, ExecutionStatus::Completed).await,
            RunOutcome::Failed => self.close(result, ctx, log, ExecutionStatus::Failed).await,
            RunOutcome::Cancelled => self.close(result, ctx, log, ExecutionStatus::Cancelled).await,
            RunOutcome::Suspended(continuation) => self.park(result, ctx, log, continuation).await,
        }
    }

    /// The terminal write, inside its own fault boundary: a failed write is
    /// reported on the result and never escapes.
    async fn close(
        &self,
        result: WorkflowRunResult,
        ctx: ExecutionContext,
        log: ExecutionLog,
        status: ExecutionStatus,
    ) -> WorkflowRunResult {
        let mut result = result.with_status(status);
        if let Err(err) = self
            .recorder
            .finalize(ctx.execution_id, status, &log, &ctx.variables)
            .await
        {
            // Side effects already applied by the steps stand; only the
            // audit trail is lost.
            error!(execution_id = %ctx.execution_id, error = %err, "failed to finalize execution");
            result.error = Some(format!("failed to finalize execution: {err}"));
        }
        info!(execution_id = %ctx.execution_id, status = %status, "execution finished");
        result
    }

    async fn park(
        &self,
        result: WorkflowRunResult,
        ctx: ExecutionContext,
        log: ExecutionLog,
        continuation: Continuation,
    ) -> WorkflowRunResult {
        let mut result = result.with_status(continuation.status());
        if let Err(err) = self
            .recorder
            .suspend(ctx.execution_id, &continuation, &log, &ctx.variables)
            .await
        {
            error!(execution_id = %ctx.execution_id, error = %err, "failed to persist suspension");
            result.error = Some(format!("failed to persist suspension: {err}"));
        }
        info!(
            execution_id = %ctx.execution_id,
            status = %continuation.status(),
            cursor = continuation.cursor,
            "execution suspended"
        );
        result
    }

    /// Rebuild a claimed execution into a live run. A run that cannot be
    /// continued is closed `failed` and returned as `Err`.
    async fn reopen(&self, execution: WorkflowExecution) -> Result<Reopened, WorkflowRunResult> {
        let mut log = ExecutionLog::from(execution.logs);
        let ctx = ExecutionContext {
            workflow_id: execution.workflow_id,
            execution_id: execution.id,
            trigger_data: execution.trigger_data,
            variables: execution.variables,
        };

        let workflow = self.store.get_workflow(execution.workflow_id).await;
        let name = match &workflow {
            Ok(Some(w)) => w.name.clone(),
            _ => String::new(),
        };
        let result = WorkflowRunResult::new(execution.workflow_id, name, Some(execution.id));

        let problem = match (workflow, execution.continuation) {
            (Ok(Some(_)), Some(continuation)) => {
                return Ok(Reopened {
                    result,
                    ctx,
                    log,
                    cursor: continuation.cursor,
                })
            }
            (Ok(Some(_)), None) => "ERROR: no continuation recorded".to_string(),
            (Ok(None), _) => "ERROR: workflow no longer exists".to_string(),
            (Err(err), _) => format!("ERROR: could not load workflow: {err}"),
        };

        warn!(execution_id = %ctx.execution_id, "{problem}");
        log.note(problem);
        Err(self.close(result, ctx, log, ExecutionStatus::Failed).await)
    }
}
