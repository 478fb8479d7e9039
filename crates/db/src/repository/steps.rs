//! Workflow step reads.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowStepRow};

/// All steps of `workflow_id`, ascending by `sort_order`.
pub async fn list_steps(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<WorkflowStepRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowStepRow>(
        r#"
        SELECT id, workflow_id, sort_order, step_type, step_config
        FROM workflow_steps
        WHERE workflow_id = $1
        ORDER BY sort_order ASC
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
