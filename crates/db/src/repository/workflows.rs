//! Workflow CRUD operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{WorkflowRow, WorkflowStepRow},
};

const WORKFLOW_COLUMNS: &str = "id, name, trigger_type, trigger_config, is_active, created_at";

/// Insert a workflow together with its steps in one transaction.
///
/// A duplicate `(workflow_id, sort_order)` violates the unique index and
/// rolls the whole insert back.
pub async fn create_workflow(
    pool: &PgPool,
    workflow: &WorkflowRow,
    steps: &[WorkflowStepRow],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, trigger_type, trigger_config, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(workflow.id)
    .bind(&workflow.name)
    .bind(&workflow.trigger_type)
    .bind(&workflow.trigger_config)
    .bind(workflow.is_active)
    .bind(workflow.created_at)
    .execute(&mut *tx)
    .await?;

    for step in steps {
        sqlx::query(
            r#"
            INSERT INTO workflow_steps (id, workflow_id, sort_order, step_type, step_config)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(step.id)
        .bind(step.workflow_id)
        .bind(step.sort_order)
        .bind(&step.step_type)
        .bind(&step.step_config)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch a single live (not deleted) workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all live workflows ordered by creation time (newest first).
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE deleted_at IS NULL \
         ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active workflows whose `trigger_type` equals `trigger_type`.
pub async fn list_active_by_trigger(
    pool: &PgPool,
    trigger_type: &str,
) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {WORKFLOW_COLUMNS} FROM workflows \
         WHERE is_active AND deleted_at IS NULL AND trigger_type = $1"
    ))
    .bind(trigger_type)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Soft-delete a workflow: it stops matching events and disappears from
/// reads, while its steps and execution records stay.
///
/// Returns `DbError::NotFound` if no live workflow has this id.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE workflows SET is_active = FALSE, deleted_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
