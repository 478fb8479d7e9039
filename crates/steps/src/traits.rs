//! The `StepHandler` trait, the contract every step type must fulfil.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ExecutionContext, StepError, Variables};

/// Why a step asked the run to pause after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Suspend {
    /// Resume once the wall clock passes `resume_at`.
    Until { resume_at: DateTime<Utc> },
    /// Resume when a human records a decision.
    Approval {
        /// Who may decide. Empty means anyone.
        approvers: Vec<String>,
        prompt: Option<String>,
    },
}

/// What a handler reports back to the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// `false` halts the run; the execution ends `failed`.
    pub success: bool,
    /// Goes into the execution log verbatim.
    pub message: String,
    /// Merged into the context only when `success` is true.
    pub variables: Variables,
    /// Set when the step completed but the run must pause after it.
    pub suspend: Option<Suspend>,
}

impl StepOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            variables: Variables::new(),
            suspend: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(message)
        }
    }

    pub fn suspended(message: impl Into<String>, suspend: Suspend) -> Self {
        Self {
            suspend: Some(suspend),
            ..Self::success(message)
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// The core step trait.
///
/// `Config` is decoded from the stored `step_config` before the run begins,
/// so a handler only ever sees a well-formed configuration.
#[async_trait]
pub trait StepHandler: Send + Sync + 'static {
    /// Tag stored in `workflow_steps.step_type`.
    const STEP_TYPE: &'static str;

    type Config: DeserializeOwned + Send + Sync + 'static;

    /// Run the step.
    ///
    /// `Ok` with `success = false` is an ordinary failure. `Err` means the
    /// step raised; the runner logs it with an `ERROR` prefix. Both halt
    /// the run.
    async fn execute(
        &self,
        config: &Self::Config,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError>;
}
