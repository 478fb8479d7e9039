//! Step Executor: runs one segment of a workflow's steps against a context.
//!
//! 1. Decodes every step's config up front; a bad config fails the run
//!    before anything has side effects.
//! 2. Runs the steps strictly in order, logging one line per step.
//! 3. Merges a step's variables only when it succeeded.
//! 4. Stops at the first failure, raised error, panic, suspension or
//!    cancellation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use steps::{ExecutionContext, PreparedStep, StepError, StepRegistry};

use crate::models::{Continuation, ExecutionLog, WorkflowStep};
use crate::store::WorkflowStore;

/// How a run segment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed,
    Suspended(Continuation),
    Cancelled,
}

pub struct StepRunner<'a> {
    registry: &'a StepRegistry,
    store: &'a dyn WorkflowStore,
    max_run_duration: Option<Duration>,
}

impl<'a> StepRunner<'a> {
    pub fn new(
        registry: &'a StepRegistry,
        store: &'a dyn WorkflowStore,
        max_run_duration: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            store,
            max_run_duration,
        }
    }

    /// Run `steps` in the order given.
    pub async fn run(
        &self,
        steps: &[WorkflowStep],
        ctx: &mut ExecutionContext,
        log: &mut ExecutionLog,
    ) -> RunOutcome {
        let mut prepared: Vec<(&WorkflowStep, Box<dyn PreparedStep>)> =
            Vec::with_capacity(steps.len());
        for step in steps {
            match self.registry.prepare(&step.step_type, &step.step_config) {
                Ok(p) => prepared.push((step, p)),
                Err(err) => {
                    log.step(step.sort_order, &step.step_type, &err.to_string());
                    return RunOutcome::Failed;
                }
            }
        }

        let started = Instant::now();

        for (step, handler) in prepared {
            if self.cancel_requested(ctx.execution_id).await {
                log.note(format!("Cancelled before step {}", step.sort_order));
                return RunOutcome::Cancelled;
            }

            if let Some(limit) = self.max_run_duration {
                if started.elapsed() > limit {
                    log.error(
                        step.sort_order,
                        &step.step_type,
                        &format!("run exceeded its {}s time limit", limit.as_secs()),
                    );
                    return RunOutcome::Failed;
                }
            }

            debug!(
                execution_id = %ctx.execution_id,
                sort_order = step.sort_order,
                step_type = %step.step_type,
                "running step"
            );

            let result = AssertUnwindSafe(handler.run(ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(StepError::Panicked(panic_message(panic.as_ref()))));

            match result {
                Ok(outcome) => {
                    log.step(step.sort_order, &step.step_type, &outcome.message);
                    if !outcome.success {
                        return RunOutcome::Failed;
                    }
                    ctx.merge(outcome.variables);

                    if let Some(wake) = outcome.suspend {
                        return RunOutcome::Suspended(Continuation {
                            cursor: step.sort_order,
                            wake,
                        });
                    }
                }
                Err(err) => {
                    warn!(
                        execution_id = %ctx.execution_id,
                        sort_order = step.sort_order,
                        error = %err,
                        "step raised"
                    );
                    log.error(step.sort_order, &step.step_type, &err.to_string());
                    return RunOutcome::Failed;
                }
            }
        }

        RunOutcome::Completed
    }

    async fn cancel_requested(&self, execution_id: Uuid) -> bool {
        match self.store.cancel_requested(execution_id).await {
            Ok(requested) => requested,
            Err(err) => {
                // An unreadable flag must not fail an otherwise healthy run.
                warn!(execution_id = %execution_id, error = %err, "could not read cancel flag");
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};
    use steps::mock::MockStep;
    use steps::{Collaborators, StepSettings, Suspend};

    struct Fixture {
        registry: StepRegistry,
        store: MemoryStore,
        mock: MockStep,
    }

    fn fixture() -> Fixture {
        let mock = MockStep::new();
        let mut registry =
            StepRegistry::builtin(Collaborators::disconnected(), StepSettings::default());
        registry.register(mock.clone());
        Fixture {
            registry,
            store: MemoryStore::new(),
            mock,
        }
    }

    impl Fixture {
        fn runner(&self) -> StepRunner<'_> {
            StepRunner::new(&self.registry, &self.store, None)
        }
    }

    fn step(sort_order: i32, step_type: &str, config: Value) -> WorkflowStep {
        WorkflowStep::new(Uuid::nil(), sort_order, step_type, config)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Uuid::nil(), Uuid::new_v4(), json!({ "amount": 50 }))
    }

    #[tokio::test]
    async fn variables_flow_to_later_steps() {
        let f = fixture();
        let steps = [
            step(1, "mock", json!({ "label": "a", "variables": { "x": 1 } })),
            step(2, "mock", json!({ "label": "b" })),
        ];
        let mut ctx = ctx();
        let mut log = ExecutionLog::new();

        let outcome = f.runner().run(&steps, &mut ctx, &mut log).await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(f.mock.calls()[1].variables["x"], json!(1));
        assert_eq!(log.len(), 2);
        assert!(log.lines()[1].ends_with("Step 2 (mock): b ok"));
    }

    #[tokio::test]
    async fn failed_condition_halts_without_merging() {
        let f = fixture();
        let steps = [
            step(
                1,
                "condition",
                json!({ "field": "amount", "operator": "greater_than", "value": 100 }),
            ),
            step(2, "mock", json!({ "label": "never" })),
        ];
        let mut ctx = ctx();
        let mut log = ExecutionLog::new();

        let outcome = f.runner().run(&steps, &mut ctx, &mut log).await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert!(f.mock.calls().is_empty());
        assert_eq!(log.len(), 1);
        assert!(log.lines()[0].contains("Step 1 (condition): Condition not met"));
    }

    #[tokio::test]
    async fn failing_step_variables_are_not_merged() {
        let f = fixture();
        let steps = [step(
            1,
            "mock",
            json!({ "label": "a", "behaviour": "fail", "variables": { "x": 1 } }),
        )];
        let mut ctx = ctx();
        let mut log = ExecutionLog::new();

        f.runner().run(&steps, &mut ctx, &mut log).await;
        assert!(ctx.variables.is_empty());
    }

    #[tokio::test]
    async fn raised_error_and_panic_are_logged_with_error_prefix() {
        for behaviour in ["error", "panic"] {
            let f = fixture();
            let steps = [
                step(1, "mock", json!({ "label": "boom", "behaviour": behaviour })),
                step(2, "mock", json!({ "label": "never" })),
            ];
            let mut ctx = ctx();
            let mut log = ExecutionLog::new();

            let outcome = f.runner().run(&steps, &mut ctx, &mut log).await;

            assert_eq!(outcome, RunOutcome::Failed);
            assert_eq!(f.mock.calls().len(), 1, "{behaviour}");
            let last = log.last().expect("logged");
            assert!(last.contains("Step 1 (mock): ERROR: "), "{last}");
        }
    }

    #[tokio::test]
    async fn bad_config_fails_before_any_step_runs() {
        let f = fixture();
        let steps = [
            step(1, "mock", json!({ "label": "first" })),
            step(2, "wait", json!({ "delay_ms": "soon" })),
        ];
        let mut ctx = ctx();
        let mut log = ExecutionLog::new();

        let outcome = f.runner().run(&steps, &mut ctx, &mut log).await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert!(f.mock.calls().is_empty());
        assert!(log.lines()[0].contains("Step 2 (wait): Invalid wait config"));
    }

    #[tokio::test]
    async fn unknown_step_type_is_a_plain_failure() {
        let f = fixture();
        let steps = [step(1, "teleport", json!({}))];
        let mut log = ExecutionLog::new();

        let outcome = f.runner().run(&steps, &mut ctx(), &mut log).await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert!(log.lines()[0].ends_with("Step 1 (teleport): Unknown step type: teleport"));
    }

    #[tokio::test]
    async fn approval_suspends_at_its_sort_order() {
        let f = fixture();
        let steps = [
            step(4, "approval", json!({ "approvers": ["lead"] })),
            step(5, "mock", json!({ "label": "after" })),
        ];
        let mut log = ExecutionLog::new();

        let outcome = f.runner().run(&steps, &mut ctx(), &mut log).await;

        match outcome {
            RunOutcome::Suspended(c) => {
                assert_eq!(c.cursor, 4);
                assert!(matches!(c.wake, Suspend::Approval { .. }));
            }
            other => panic!("expected suspension, got {other:?}"),
        }
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_ceiling_is_checked_between_steps() {
        let f = fixture();
        let steps = [
            step(1, "mock", json!({ "label": "slow", "delay_ms": 5_000 })),
            step(2, "mock", json!({ "label": "never" })),
        ];
        let mut log = ExecutionLog::new();

        let outcome = StepRunner::new(&f.registry, &f.store, Some(Duration::from_secs(1)))
            .run(&steps, &mut ctx(), &mut log)
            .await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(f.mock.calls().len(), 1);
        assert!(log.last().expect("logged").contains("Step 2 (mock): ERROR: run exceeded"));
    }
}
