//! Interfaces to the systems step handlers act upon.
//!
//! Production implementations live next to the database in the `engine`
//! crate (and [`crate::http::ReqwestClient`] for HTTP); tests use
//! [`crate::mock`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::http::HttpMethod;
use crate::CollaboratorError;

/// Resolves agents and managers.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// The eligible agent with the fewest open assignments, if any.
    async fn least_busy_agent(&self) -> Result<Option<String>, CollaboratorError>;

    async fn managers(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// Target records (tickets, leads, …) that steps mutate.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub message: String,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Enqueue one notification and return the channel's id for it.
    ///
    /// Returning `Ok` is the enqueue confirmation.
    async fn enqueue(&self, notification: &Notification) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// A JSON string is sent as raw text; anything else as a JSON body.
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON when the body parses, the raw text otherwise, `None`
    /// when empty.
    pub body: Option<Value>,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError>;
}

/// Everything the built-in handlers need, bundled for
/// [`StepRegistry::builtin`](crate::StepRegistry::builtin).
#[derive(Clone)]
pub struct Collaborators {
    pub agents: Arc<dyn AgentDirectory>,
    pub records: Arc<dyn RecordStore>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub http: Arc<dyn HttpClient>,
}

impl Collaborators {
    /// Collaborators that refuse every call.
    ///
    /// Enough to build a registry whose only job is decoding step configs
    /// (authoring-time validation).
    pub fn disconnected() -> Self {
        let d = Arc::new(Disconnected);
        Self {
            agents: d.clone(),
            records: d.clone(),
            notifications: d.clone(),
            http: d,
        }
    }
}

struct Disconnected;

const NOT_CONNECTED: &str = "not connected";

#[async_trait]
impl AgentDirectory for Disconnected {
    async fn least_busy_agent(&self) -> Result<Option<String>, CollaboratorError> {
        Err(CollaboratorError::unavailable("agent directory", NOT_CONNECTED))
    }

    async fn managers(&self) -> Result<Vec<String>, CollaboratorError> {
        Err(CollaboratorError::unavailable("agent directory", NOT_CONNECTED))
    }
}

#[async_trait]
impl RecordStore for Disconnected {
    async fn patch(
        &self,
        _: &str,
        _: &str,
        _: Map<String, Value>,
    ) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::unavailable("record store", NOT_CONNECTED))
    }
}

#[async_trait]
impl NotificationChannel for Disconnected {
    async fn enqueue(&self, _: &Notification) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::unavailable("notification channel", NOT_CONNECTED))
    }
}

#[async_trait]
impl HttpClient for Disconnected {
    async fn send(&self, _: HttpRequest) -> Result<HttpResponse, CollaboratorError> {
        Err(CollaboratorError::unavailable("http", NOT_CONNECTED))
    }
}
