//! Test doubles for the collaborator traits, plus `MockStep`, a scripted
//! step type.
//!
//! Useful in unit and integration tests where the real database or HTTP
//! endpoint is either unavailable or irrelevant. Every double records what it
//! was asked to do for later assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::collaborators::{
    AgentDirectory, HttpClient, HttpRequest, HttpResponse, Notification, NotificationChannel,
    RecordStore,
};
use crate::{CollaboratorError, ExecutionContext, StepError, StepHandler, StepOutcome, Variables};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Agent directory with a fixed answer.
#[derive(Debug, Default)]
pub struct MockAgentDirectory {
    least_busy: Option<String>,
    managers: Vec<String>,
    error: Option<String>,
}

impl MockAgentDirectory {
    pub fn with_agent(agent: impl Into<String>) -> Self {
        Self {
            least_busy: Some(agent.into()),
            ..Self::default()
        }
    }

    /// No active agents, no managers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every call fails as unavailable.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_managers<I, S>(mut self, managers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managers = managers.into_iter().map(Into::into).collect();
        self
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        match &self.error {
            Some(message) => Err(CollaboratorError::unavailable(
                "agent directory",
                message.clone(),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AgentDirectory for MockAgentDirectory {
    async fn least_busy_agent(&self) -> Result<Option<String>, CollaboratorError> {
        self.check()?;
        Ok(self.least_busy.clone())
    }

    async fn managers(&self) -> Result<Vec<String>, CollaboratorError> {
        self.check()?;
        Ok(self.managers.clone())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One `patch` call seen by [`MockRecordStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch {
    pub collection: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct MockRecordStore {
    patches: Mutex<Vec<RecordPatch>>,
    error: Option<String>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Successful patches, in call order.
    pub fn patches(&self) -> Vec<RecordPatch> {
        lock(&self.patches).clone()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), CollaboratorError> {
        if let Some(message) = &self.error {
            return Err(CollaboratorError::unavailable("record store", message.clone()));
        }
        lock(&self.patches).push(RecordPatch {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Notification channel that hands out ids `n-1`, `n-2`, ...
#[derive(Debug, Default)]
pub struct MockNotificationChannel {
    sent: Mutex<Vec<Notification>>,
    reject: bool,
    delay: Option<Duration>,
}

impl MockNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never confirms an enqueue.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl NotificationChannel for MockNotificationChannel {
    async fn enqueue(&self, notification: &Notification) -> Result<String, CollaboratorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject {
            return Err(CollaboratorError::unavailable(
                "notification channel",
                "enqueue not confirmed",
            ));
        }
        let mut sent = lock(&self.sent);
        sent.push(notification.clone());
        Ok(format!("n-{}", sent.len()))
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// HTTP client that replays canned responses.
///
/// Responses are consumed in order; the last one repeats.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    unreachable: bool,
}

impl MockHttpClient {
    pub fn responding(status: u16, body: Option<Value>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([HttpResponse { status, body }])),
            ..Self::default()
        }
    }

    /// Every request fails at the transport level.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn then(self, status: u16, body: Option<Value>) -> Self {
        lock(&self.responses).push_back(HttpResponse { status, body });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError> {
        lock(&self.requests).push(request);
        if self.unreachable {
            return Err(CollaboratorError::unavailable("http", "connection refused"));
        }
        let mut responses = lock(&self.responses);
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        Ok(response.unwrap_or(HttpResponse {
            status: 200,
            body: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// MockStep
// ---------------------------------------------------------------------------

/// What a [`MockStep`] does when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockBehaviour {
    /// Report success, emitting the configured variables.
    #[default]
    Succeed,
    /// Report `success = false`.
    Fail,
    /// Raise a collaborator error.
    Error,
    /// Panic inside the handler.
    Panic,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MockStepConfig {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub behaviour: MockBehaviour,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub delay_ms: u64,
}

/// One `MockStep` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub label: String,
    pub execution_id: Uuid,
    pub trigger_data: Value,
    /// Variables visible to the step when it started.
    pub variables: Variables,
}

/// Step type `mock`, scripted entirely by its config.
///
/// Clones share the call log, so keep one clone for assertions and register
/// the other.
#[derive(Debug, Clone, Default)]
pub struct MockStep {
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// All invocations, in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Labels of the steps run by `execution_id`, in order.
    pub fn labels_for(&self, execution_id: Uuid) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.execution_id == execution_id)
            .map(|c| c.label.clone())
            .collect()
    }
}

#[async_trait]
impl StepHandler for MockStep {
    const STEP_TYPE: &'static str = "mock";
    type Config = MockStepConfig;

    async fn execute(
        &self,
        config: &MockStepConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        lock(&self.calls).push(MockCall {
            label: config.label.clone(),
            execution_id: ctx.execution_id,
            trigger_data: ctx.trigger_data.clone(),
            variables: ctx.variables.clone(),
        });

        if config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }

        let label = &config.label;
        match config.behaviour {
            MockBehaviour::Succeed => {
                let mut outcome = StepOutcome::success(
                    config.message.clone().unwrap_or_else(|| format!("{label} ok")),
                );
                outcome.variables = config.variables.clone();
                Ok(outcome)
            }
            MockBehaviour::Fail => Ok(StepOutcome::failure(
                config.message.clone().unwrap_or_else(|| format!("{label} failed")),
            )),
            MockBehaviour::Error => Err(CollaboratorError::unavailable(
                "mock",
                config.message.clone().unwrap_or_else(|| format!("{label} raised")),
            )
            .into()),
            MockBehaviour::Panic => panic!("{label} panicked"),
        }
    }
}
