//! Workflow execution repository functions.
//!
//! Status transitions out of `waiting` / `waiting_approval` are
//! compare-and-set updates, so two claimants never both win.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowExecutionRow};

const EXECUTION_COLUMNS: &str = "id, workflow_id, status, trigger_data, logs, variables, \
     continuation, resume_at, cancel_requested, started_at, completed_at";

/// Insert a new execution record.
pub async fn insert_execution(pool: &PgPool, row: &WorkflowExecutionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, status, trigger_data, logs, variables,
             continuation, resume_at, cancel_requested, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.status)
    .bind(&row.trigger_data)
    .bind(&row.logs)
    .bind(&row.variables)
    .bind(&row.continuation)
    .bind(row.resume_at)
    .bind(row.cancel_requested)
    .bind(row.started_at)
    .bind(row.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<WorkflowExecutionRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
        "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// The single terminal write: status, logs, variables and `completed_at`.
pub async fn finalize_execution(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    logs: &serde_json::Value,
    variables: &serde_json::Value,
    completed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $2, logs = $3, variables = $4, completed_at = $5,
            continuation = NULL, resume_at = NULL
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(logs)
    .bind(variables)
    .bind(completed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Park a run: persist what it has done so far and where to pick up.
pub async fn suspend_execution(
    pool: &PgPool,
    id: Uuid,
    status: &str,
    logs: &serde_json::Value,
    variables: &serde_json::Value,
    continuation: &serde_json::Value,
    resume_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $2, logs = $3, variables = $4, continuation = $5, resume_at = $6
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(logs)
    .bind(variables)
    .bind(continuation)
    .bind(resume_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Move one execution from `from` to `running`.
///
/// Returns `None` when the execution is not (or no longer) in `from`.
pub async fn claim_execution(
    pool: &PgPool,
    id: Uuid,
    from: &str,
) -> Result<Option<WorkflowExecutionRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowExecutionRow>(&format!(
        r#"
        UPDATE workflow_executions
        SET status = 'running', resume_at = NULL
        WHERE id = $1 AND status = $2
        RETURNING {EXECUTION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(from)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Atomically claim up to `limit` `waiting` executions whose `resume_at`
/// has passed, oldest first, and mark them `running`.
///
/// Uses `FOR UPDATE SKIP LOCKED` so multiple schedulers can poll safely
/// without stepping on each other.
pub async fn claim_due(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<WorkflowExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        UPDATE workflow_executions AS e
        SET status = 'running', resume_at = NULL
        FROM (
            SELECT id
            FROM workflow_executions
            WHERE status = 'waiting' AND resume_at <= $1
            ORDER BY resume_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        ) AS due
        WHERE e.id = due.id
        RETURNING e.id, e.workflow_id, e.status, e.trigger_data, e.logs, e.variables,
                  e.continuation, e.resume_at, e.cancel_requested, e.started_at, e.completed_at
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Flag a `running` execution for cooperative cancellation.
///
/// Returns `false` when the execution is not running.
pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE workflow_executions SET cancel_requested = TRUE \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn cancel_requested(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    sqlx::query_scalar::<_, bool>("SELECT cancel_requested FROM workflow_executions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}
