//! Step Loader: fetch a workflow's steps in execution order, and the
//! authoring-time checks on a step list.
//!
//! Steps are fetched fresh on every run segment; nothing is cached, so an
//! edit takes effect for every run that has not loaded its steps yet.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use steps::StepRegistry;

use crate::models::WorkflowStep;
use crate::store::{StoreError, WorkflowStore};
use crate::EngineError;

pub struct StepLoader {
    store: Arc<dyn WorkflowStore>,
}

impl StepLoader {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// The workflow's steps, ascending by `sort_order`, whatever order the
    /// store returned them in.
    pub async fn load(&self, workflow_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let mut steps = self.store.steps(workflow_id).await?;
        // Stable, so tied steps at least keep their stored order.
        steps.sort_by_key(|s| s.sort_order);

        if let Some(tie) = steps.windows(2).find(|w| w[0].sort_order == w[1].sort_order) {
            warn!(
                workflow_id = %workflow_id,
                sort_order = tie[0].sort_order,
                "workflow has steps sharing a sort_order"
            );
        }
        Ok(steps)
    }
}

/// Check a step list before it is stored.
///
/// Rules enforced:
/// 1. `sort_order` values are unique.
/// 2. Every `step_type` is registered.
/// 3. Every `step_config` decodes into its handler's config type.
pub fn validate_steps(steps: &[WorkflowStep], registry: &StepRegistry) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.sort_order) {
            return Err(EngineError::DuplicateSortOrder(step.sort_order));
        }
    }

    for step in steps {
        registry
            .prepare(&step.step_type, &step.step_config)
            .map_err(|source| EngineError::InvalidStep {
                sort_order: step.sort_order,
                source,
            })?;
    }
    Ok(())
}
