use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use engine::{Workflow, WorkflowDefinition, WorkflowStep};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// A workflow with its steps in execution order.
#[derive(Debug, Serialize)]
pub struct WorkflowDto {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<WorkflowStep>,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Workflow>>> {
    Ok(Json(state.engine.list_workflows().await?))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> ApiResult<Json<WorkflowDto>> {
    let (workflow, steps) = state.engine.get_workflow(id).await?;
    Ok(Json(WorkflowDto { workflow, steps }))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<WorkflowDefinition>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkflowDto>)> {
    let Json(definition) = payload?;
    if definition.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    let (workflow, steps) = state.engine.create_workflow(definition).await?;
    Ok((StatusCode::CREATED, Json(WorkflowDto { workflow, steps })))
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.engine.delete_workflow(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
