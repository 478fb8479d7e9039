//! `function`: named built-in routines.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{default_collection, default_record_id_field, record_id};
use crate::collaborators::{AgentDirectory, RecordStore};
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome};

pub const ASSIGN_TO_LEAST_BUSY_AGENT: &str = "assign_to_least_busy_agent";

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    pub function_name: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_record_id_field")]
    pub record_id_field: String,
    #[serde(default = "default_assignee_field")]
    pub assignee_field: String,
}

fn default_assignee_field() -> String {
    "assigned_to".to_string()
}

pub struct FunctionHandler {
    agents: Arc<dyn AgentDirectory>,
    records: Arc<dyn RecordStore>,
}

impl FunctionHandler {
    pub fn new(agents: Arc<dyn AgentDirectory>, records: Arc<dyn RecordStore>) -> Self {
        Self { agents, records }
    }

    async fn assign_to_least_busy_agent(
        &self,
        config: &FunctionConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let Some(id) = record_id(ctx, &config.record_id_field) else {
            return Ok(StepOutcome::failure(format!(
                "Cannot assign: trigger data has no '{}'",
                config.record_id_field
            )));
        };

        let Some(agent) = self.agents.least_busy_agent().await? else {
            return Ok(StepOutcome::failure("No available agent found"));
        };

        let mut fields = Map::new();
        fields.insert(config.assignee_field.clone(), Value::String(agent.clone()));
        self.records.patch(&config.collection, &id, fields).await?;

        Ok(
            StepOutcome::success(format!("Assigned {} {id} to agent {agent}", config.collection))
                .with_variable("assigned_agent_id", json!(agent)),
        )
    }
}

#[async_trait]
impl StepHandler for FunctionHandler {
    const STEP_TYPE: &'static str = "function";
    type Config = FunctionConfig;

    async fn execute(
        &self,
        config: &FunctionConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        match config.function_name.as_str() {
            ASSIGN_TO_LEAST_BUSY_AGENT => self.assign_to_least_busy_agent(config, ctx).await,
            other => Ok(StepOutcome::failure(format!("Unknown function: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAgentDirectory, MockRecordStore};
    use uuid::Uuid;

    fn config(name: &str) -> FunctionConfig {
        serde_json::from_value(json!({ "function_name": name })).expect("valid config")
    }

    fn ctx(trigger: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), Uuid::new_v4(), trigger)
    }

    #[tokio::test]
    async fn assigns_ticket_to_least_busy_agent() {
        let records = Arc::new(MockRecordStore::new());
        let handler = FunctionHandler::new(
            Arc::new(MockAgentDirectory::with_agent("agent-7")),
            records.clone(),
        );

        let outcome = handler
            .execute(&config(ASSIGN_TO_LEAST_BUSY_AGENT), &ctx(json!({ "ticket_id": 42 })))
            .await
            .expect("no error");

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.variables["assigned_agent_id"], json!("agent-7"));

        let patches = records.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].collection, "tickets");
        assert_eq!(patches[0].id, "42");
        assert_eq!(patches[0].fields["assigned_to"], json!("agent-7"));
    }

    #[tokio::test]
    async fn no_available_agent_is_a_failure() {
        let records = Arc::new(MockRecordStore::new());
        let handler = FunctionHandler::new(Arc::new(MockAgentDirectory::empty()), records.clone());

        let outcome = handler
            .execute(&config(ASSIGN_TO_LEAST_BUSY_AGENT), &ctx(json!({ "ticket_id": "t-1" })))
            .await
            .expect("no error");

        assert!(!outcome.success);
        assert!(records.patches().is_empty());
    }

    #[tokio::test]
    async fn unreachable_directory_is_raised() {
        let records = Arc::new(MockRecordStore::new());
        let handler = FunctionHandler::new(
            Arc::new(MockAgentDirectory::failing("timed out")),
            records.clone(),
        );

        let err = handler
            .execute(&config(ASSIGN_TO_LEAST_BUSY_AGENT), &ctx(json!({ "ticket_id": "t-1" })))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "agent directory unavailable: timed out");
        assert!(records.patches().is_empty());
    }

    #[tokio::test]
    async fn unknown_function_fails_with_its_name() {
        let handler = FunctionHandler::new(
            Arc::new(MockAgentDirectory::empty()),
            Arc::new(MockRecordStore::new()),
        );

        let outcome = handler
            .execute(&config("summon_manager"), &ctx(json!({})))
            .await
            .expect("no error");

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unknown function: summon_manager");
    }
}
