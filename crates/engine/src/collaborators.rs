//! Postgres-backed implementations of the step collaborator traits.

use std::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use db::repository::{agents, notifications, records};
use db::{DbError, DbPool};
use steps::collaborators::{AgentDirectory, Notification, NotificationChannel, RecordStore};
use steps::http::ReqwestClient;
use steps::{CollaboratorError, Collaborators};

fn unavailable(service: &'static str) -> impl Fn(DbError) -> CollaboratorError {
    move |err| CollaboratorError::unavailable(service, err.to_string())
}

/// Agents and managers from the `agents` table.
pub struct PgAgentDirectory {
    pool: DbPool,
}

impl PgAgentDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentDirectory for PgAgentDirectory {
    async fn least_busy_agent(&self) -> Result<Option<String>, CollaboratorError> {
        agents::least_busy_agent(&self.pool)
            .await
            .map_err(unavailable("agent directory"))
    }

    async fn managers(&self) -> Result<Vec<String>, CollaboratorError> {
        agents::list_manager_ids(&self.pool)
            .await
            .map_err(unavailable("agent directory"))
    }
}

/// Target records in the `records` table.
pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), CollaboratorError> {
        records::patch_record(&self.pool, collection, id, &Value::Object(fields))
            .await
            .map_err(|err| match err {
                DbError::NotFound => CollaboratorError::unavailable(
                    "record store",
                    format!("no {collection} record with id {id}"),
                ),
                other => CollaboratorError::unavailable("record store", other.to_string()),
            })
    }
}

/// The `notifications` outbox. A committed insert is the confirmation.
pub struct PgNotificationOutbox {
    pool: DbPool,
}

impl PgNotificationOutbox {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationChannel for PgNotificationOutbox {
    async fn enqueue(&self, notification: &Notification) -> Result<String, CollaboratorError> {
        let row = notifications::enqueue_notification(
            &self.pool,
            &notification.recipient,
            &notification.subject,
            &notification.message,
        )
        .await
        .map_err(unavailable("notification channel"))?;
        Ok(row.id.to_string())
    }
}

/// Production collaborators: Postgres for agents, records and
/// notifications; `reqwest` with `http_timeout` for webhooks.
pub fn postgres_collaborators(
    pool: DbPool,
    http_timeout: Duration,
) -> Result<Collaborators, CollaboratorError> {
    Ok(Collaborators {
        agents: Arc::new(PgAgentDirectory::new(pool.clone())),
        records: Arc::new(PgRecordStore::new(pool.clone())),
        notifications: Arc::new(PgNotificationOutbox::new(pool)),
        http: Arc::new(ReqwestClient::new(http_timeout)?),
    })
}
