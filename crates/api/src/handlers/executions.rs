use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use engine::{ApprovalDecision, WorkflowExecution, WorkflowRunResult};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<WorkflowExecution>> {
    Ok(Json(state.engine.get_execution(id).await?))
}

pub async fn approval(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    payload: Result<Json<ApprovalDecision>, JsonRejection>,
) -> ApiResult<Json<WorkflowRunResult>> {
    let Json(decision) = payload?;
    if decision.approver.trim().is_empty() {
        return Err(ApiError::Validation("approver must not be empty".into()));
    }
    Ok(Json(state.engine.decide(id, decision).await?))
}

pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<WorkflowExecution>> {
    Ok(Json(state.engine.cancel(id).await?))
}
