//! Step-type registry.
//!
//! Maps each `step_type` tag to a handler and decodes the raw `step_config`
//! into that handler's typed configuration. The runner only ever sees the
//! resulting [`PreparedStep`] trait objects, so adding a step type means
//! registering one more handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::handlers::{
    ApprovalHandler, ConditionHandler, FunctionHandler, NotifyHandler, TaskHandler, WaitHandler,
    WebhookHandler,
};
use crate::{Collaborators, ExecutionContext, StepError, StepHandler, StepOutcome};

/// A step whose configuration has been decoded and bound to its handler.
#[async_trait]
pub trait PreparedStep: Send + Sync {
    fn step_type(&self) -> &'static str;

    async fn run(&self, ctx: &ExecutionContext) -> Result<StepOutcome, StepError>;
}

struct Bound<H: StepHandler> {
    handler: Arc<H>,
    config: H::Config,
}

#[async_trait]
impl<H: StepHandler> PreparedStep for Bound<H> {
    fn step_type(&self) -> &'static str {
        H::STEP_TYPE
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<StepOutcome, StepError> {
        self.handler.execute(&self.config, ctx).await
    }
}

type Decoder = Box<dyn Fn(Value) -> Result<Box<dyn PreparedStep>, StepError> + Send + Sync>;

/// Tuning knobs for the built-in handlers.
#[derive(Debug, Clone)]
pub struct StepSettings {
    /// Bound on each agent-directory and notification-channel call.
    pub notify_timeout: Duration,
    /// Wait steps up to this long sleep in process instead of suspending.
    pub inline_wait_max: Duration,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            notify_timeout: Duration::from_secs(10),
            inline_wait_max: Duration::from_millis(1000),
        }
    }
}

/// Maps `step_type` tags to handlers.
#[derive(Default)]
pub struct StepRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the seven built-in step types.
    pub fn builtin(collaborators: Collaborators, settings: StepSettings) -> Self {
        let mut registry = Self::new();
        registry
            .register(ConditionHandler)
            .register(FunctionHandler::new(
                collaborators.agents.clone(),
                collaborators.records.clone(),
            ))
            .register(TaskHandler::new(collaborators.records.clone()))
            .register(NotifyHandler::new(
                collaborators.agents.clone(),
                collaborators.notifications.clone(),
                settings.notify_timeout,
            ))
            .register(ApprovalHandler)
            .register(WebhookHandler::new(collaborators.http))
            .register(WaitHandler::new(settings.inline_wait_max));
        registry
    }

    /// Register `handler` under `H::STEP_TYPE`, replacing any previous one.
    pub fn register<H: StepHandler>(&mut self, handler: H) -> &mut Self {
        let handler = Arc::new(handler);
        let decoder: Decoder = Box::new(
            move |raw: Value| -> Result<Box<dyn PreparedStep>, StepError> {
                let config: H::Config =
                    serde_json::from_value(raw).map_err(|e| StepError::InvalidConfig {
                        step_type: H::STEP_TYPE.to_string(),
                        message: e.to_string(),
                    })?;
                Ok(Box::new(Bound {
                    handler: Arc::clone(&handler),
                    config,
                }))
            },
        );
        self.decoders.insert(H::STEP_TYPE, decoder);
        self
    }

    /// Decode `step_config` for `step_type`. A `null` config decodes as `{}`.
    pub fn prepare(
        &self,
        step_type: &str,
        step_config: &Value,
    ) -> Result<Box<dyn PreparedStep>, StepError> {
        let decode = self
            .decoders
            .get(step_type)
            .ok_or_else(|| StepError::UnknownStepType(step_type.to_string()))?;

        let raw = match step_config {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        decode(raw)
    }

    /// Registered tags, sorted.
    pub fn step_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort_unstable();
        types
    }
}
