use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use engine::DispatchSummary;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventDto {
    pub event_type: String,
    #[serde(default = "empty_object")]
    pub event_data: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: DispatchSummary,
}

/// Run every active workflow subscribed to the event.
///
/// Individual run failures still answer 200; only a store outage before
/// anything ran is an error response.
pub async fn dispatch(
    State(state): State<AppState>,
    payload: Result<Json<EventDto>, JsonRejection>,
) -> ApiResult<Json<DispatchResponse>> {
    let Json(event) = payload?;
    if event.event_type.trim().is_empty() {
        return Err(ApiError::Validation("event_type must not be empty".into()));
    }

    let summary = state.engine.dispatch(&event.event_type, event.event_data).await?;
    Ok(Json(DispatchResponse {
        success: true,
        summary,
    }))
}
