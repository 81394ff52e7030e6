//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

use self::state::AppState;
use crate::datasource::CollectError;
use crate::pipeline::PipelineError;
use crate::session::SessionError;
use crate::storage::StoreError;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Session(e) | ApiError::Pipeline(PipelineError::Session(e)) => match e {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
                SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Pipeline(PipelineError::Collect(CollectError::Validation(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Pipeline(PipelineError::Collect(CollectError::Source(_))) => StatusCode::BAD_GATEWAY,
            ApiError::Pipeline(PipelineError::InvalidStage { .. } | PipelineError::CannotAdvance { .. }) => {
                StatusCode::CONFLICT
            }
            ApiError::Pipeline(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = json!({
            "error": { "status": status.as_u16(), "message": self.to_string() },
            "meta": { "timestamp": chrono::Utc::now().to_rfc3339() }
        });
        (status, Json(body)).into_response()
    }
}
