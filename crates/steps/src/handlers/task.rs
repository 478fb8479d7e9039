//! `task`: generic record mutation selected by `action`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{default_collection, default_record_id_field, record_id};
use crate::collaborators::RecordStore;
use crate::{ExecutionContext, StepError, StepHandler, StepOutcome};

pub const UPDATE_TICKET: &str = "update_ticket";

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub action: String,
    #[serde(default)]
    pub field: Option<String>,
    /// Written as-is; not interpolated.
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_record_id_field")]
    pub record_id_field: String,
}

pub struct TaskHandler {
    records: Arc<dyn RecordStore>,
}

impl TaskHandler {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    async fn update_record(
        &self,
        config: &TaskConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let Some(field) = config.field.as_deref().filter(|f| !f.is_empty()) else {
            return Ok(StepOutcome::failure(format!("{} requires a 'field'", config.action)));
        };
        let Some(id) = record_id(ctx, &config.record_id_field) else {
            return Ok(StepOutcome::failure(format!(
                "Cannot update: trigger data has no '{}'",
                config.record_id_field
            )));
        };

        let mut fields = Map::new();
        fields.insert(field.to_string(), config.value.clone());
        self.records.patch(&config.collection, &id, fields).await?;

        Ok(StepOutcome::success(format!(
            "Updated {} {id}: {field} = {}",
            config.collection, config.value
        )))
    }
}

#[async_trait]
impl StepHandler for TaskHandler {
    const STEP_TYPE: &'static str = "task";
    type Config = TaskConfig;

    async fn execute(
        &self,
        config: &TaskConfig,
        ctx: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        match config.action.as_str() {
            UPDATE_TICKET => self.update_record(config, ctx).await,
            other => Ok(StepOutcome::failure(format!("Unknown action: {other}"))),
        }
    }
}
