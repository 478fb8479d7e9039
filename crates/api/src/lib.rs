//! `api` crate: HTTP REST API layer.
//!
//! Exposes:
//!   POST   /api/v1/events
//!   GET    /api/v1/executions/{id}
//!   POST   /api/v1/executions/{id}/approval
//!   POST   /api/v1/executions/{id}/cancel
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/{id}
//!   DELETE /api/v1/workflows/{id}
//!   GET    /health

pub mod error;
pub mod handlers;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::WorkflowEngine;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/events", post(handlers::events::dispatch))
        .route("/api/v1/executions/{id}", get(handlers::executions::get))
        .route("/api/v1/executions/{id}/approval", post(handlers::executions::approval))
        .route("/api/v1/executions/{id}/cancel", post(handlers::executions::cancel))
        .route(
            "/api/v1/workflows",
            get(handlers::workflows::list).post(handlers::workflows::create),
        )
        .route(
            "/api/v1/workflows/{id}",
            get(handlers::workflows::get).delete(handlers::workflows::delete),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}
