use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use engine::{EngineError, StoreError};

/// Every failed request answers `{success: false, error}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    BadBody(#[from] JsonRejection),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadBody(rejection) => rejection.status(),
            ApiError::Engine(err) => match err {
                EngineError::DuplicateSortOrder(_) | EngineError::InvalidStep { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::StoreUnavailable(_)
                | EngineError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::ExecutionNotFound(_) | EngineError::WorkflowNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::InvalidState { .. } => StatusCode::CONFLICT,
                EngineError::ApproverNotAllowed { .. } => StatusCode::FORBIDDEN,
                EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
