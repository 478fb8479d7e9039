//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub trigger_type: String,
    pub trigger_config: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_steps
// ---------------------------------------------------------------------------

/// One step of a workflow. `(workflow_id, sort_order)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStepRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub sort_order: i32,
    pub step_type: String,
    pub step_config: serde_json::Value,
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// Possible statuses for a workflow execution.
///
/// `running` may move to any other status; `waiting` and
/// `waiting_approval` move back to `running` when claimed. The other three
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Waiting,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::WaitingApproval => "waiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Waiting | Self::WaitingApproval)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"          => Ok(Self::Running),
            "waiting"          => Ok(Self::Waiting),
            "waiting_approval" => Ok(Self::WaitingApproval),
            "completed"        => Ok(Self::Completed),
            "failed"           => Ok(Self::Failed),
            "cancelled"        => Ok(Self::Cancelled),
            other              => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub trigger_data: serde_json::Value,
    /// JSON array of log lines.
    pub logs: serde_json::Value,
    /// JSON object of run variables, kept for resumption.
    pub variables: serde_json::Value,
    /// Where a suspended run picks up again.
    pub continuation: Option<serde_json::Value>,
    /// Set only while `status = 'waiting'`.
    pub resume_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// agents / notifications
// ---------------------------------------------------------------------------

/// A queued outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}
