//! Core domain models for the workflow engine.
//!
//! Workflows and their steps are authored elsewhere; during a dispatch the
//! engine only reads them. A `WorkflowExecution` is the one record a run
//! writes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use steps::{Suspend, Variables};

pub use db::ExecutionStatus;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A named, triggerable ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    /// Matched against the `event_type` of incoming events.
    pub trigger_type: String,
    /// Opaque to the engine.
    pub trigger_config: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, trigger_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger_type: trigger_type.into(),
            trigger_config: Value::Object(Default::default()),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowStep
// ---------------------------------------------------------------------------

/// One tagged unit of work within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Defines the total execution order. Unique per workflow.
    pub sort_order: i32,
    /// Selects the handler in the step registry.
    pub step_type: String,
    /// Interpreted only by the matching handler.
    pub step_config: Value,
}

impl WorkflowStep {
    pub fn new(
        workflow_id: Uuid,
        sort_order: i32,
        step_type: impl Into<String>,
        step_config: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            sort_order,
            step_type: step_type.into(),
            step_config,
        }
    }
}

// ---------------------------------------------------------------------------
// Authoring input
// ---------------------------------------------------------------------------

fn default_active() -> bool {
    true
}

/// A workflow as submitted for creation (API body, `validate` input file).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: Value,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    pub sort_order: i32,
    pub step_type: String,
    #[serde(default)]
    pub step_config: Value,
}

impl WorkflowDefinition {
    /// Assign ids and split into the stored workflow and its steps.
    pub fn into_parts(self) -> (Workflow, Vec<WorkflowStep>) {
        let mut workflow = Workflow::new(self.name, self.trigger_type);
        workflow.is_active = self.is_active;
        if !self.trigger_config.is_null() {
            workflow.trigger_config = self.trigger_config;
        }

        let steps = self
            .steps
            .into_iter()
            .map(|s| WorkflowStep::new(workflow.id, s.sort_order, s.step_type, s.step_config))
            .collect();

        (workflow, steps)
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// Where a suspended run picks up again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Continuation {
    /// `sort_order` of the step that suspended. Resumption continues with
    /// the first step ordered after it.
    pub cursor: i32,
    pub wake: Suspend,
}

impl Continuation {
    /// Status a run parked on this continuation is recorded with.
    pub fn status(&self) -> ExecutionStatus {
        match self.wake {
            Suspend::Until { .. } => ExecutionStatus::Waiting,
            Suspend::Approval { .. } => ExecutionStatus::WaitingApproval,
        }
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self.wake {
            Suspend::Until { resume_at } => Some(resume_at),
            Suspend::Approval { .. } => None,
        }
    }
}

/// One run of a workflow for one triggering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_data: Value,
    pub logs: Vec<String>,
    pub variables: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Continuation>,
    #[serde(default)]
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// A fresh `running` record with empty logs.
    pub fn start(workflow_id: Uuid, trigger_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Running,
            trigger_data,
            logs: Vec::new(),
            variables: Variables::new(),
            continuation: None,
            cancel_requested: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionLog
// ---------------------------------------------------------------------------

/// Append-only log buffer owned by one run.
///
/// The runner appends to it; the recorder persists it. Nothing else sees it
/// while the run is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionLog {
    lines: Vec<String>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[time] Step <sort_order> (<step_type>): <message>`
    pub fn step(&mut self, sort_order: i32, step_type: &str, message: &str) {
        self.lines
            .push(format!("[{}] Step {sort_order} ({step_type}): {message}", timestamp()));
    }

    /// A step that raised rather than reporting failure.
    pub fn error(&mut self, sort_order: i32, step_type: &str, message: &str) {
        self.step(sort_order, step_type, &format!("ERROR: {message}"));
    }

    /// A line about the run itself rather than one of its steps.
    pub fn note(&mut self, message: impl AsRef<str>) {
        self.lines.push(format!("[{}] {}", timestamp(), message.as_ref()));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }
}

impl From<Vec<String>> for ExecutionLog {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

impl From<ExecutionLog> for Vec<String> {
    fn from(log: ExecutionLog) -> Self {
        log.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_lines_carry_sort_order_and_type() {
        let mut log = ExecutionLog::new();
        log.step(3, "wait", "Waited 0ms");
        log.error(4, "webhook", "http unavailable: refused");

        let first = &log.lines()[0];
        assert!(first.starts_with('['));
        assert!(first.ends_with("] Step 3 (wait): Waited 0ms"), "{first}");
        assert!(log.lines()[1].ends_with("Step 4 (webhook): ERROR: http unavailable: refused"));
    }

    #[test]
    fn definition_assigns_the_workflow_id_to_every_step() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "name": "Escalate",
            "trigger_type": "ticket_created",
            "steps": [
                { "sort_order": 2, "step_type": "wait" },
                {
                    "sort_order": 1,
                    "step_type": "condition",
                    "step_config": { "field": "priority", "operator": "equals", "value": "high" }
                }
            ]
        }))
        .expect("valid definition");

        let (workflow, steps) = definition.into_parts();
        assert!(workflow.is_active);
        assert_eq!(workflow.trigger_config, json!({}));
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.workflow_id == workflow.id));
        assert_eq!(steps[0].step_config, Value::Null);
    }

    #[test]
    fn continuation_maps_wake_to_status() {
        let timed = Continuation {
            cursor: 2,
            wake: Suspend::Until { resume_at: Utc::now() },
        };
        let approval = Continuation {
            cursor: 3,
            wake: Suspend::Approval { approvers: vec![], prompt: None },
        };
        assert_eq!(timed.status(), ExecutionStatus::Waiting);
        assert!(timed.resume_at().is_some());
        assert_eq!(approval.status(), ExecutionStatus::WaitingApproval);
        assert_eq!(approval.resume_at(), None);
    }

    #[test]
    fn continuation_serialises_with_a_kind_tag() {
        let c = Continuation {
            cursor: 5,
            wake: Suspend::Approval { approvers: vec!["lead".into()], prompt: Some("ok?".into()) },
        };
        let v = serde_json::to_value(&c).expect("serialises");
        assert_eq!(
            v,
            json!({
                "cursor": 5,
                "wake": { "kind": "approval", "approvers": ["lead"], "prompt": "ok?" }
            })
        );
    }
}
