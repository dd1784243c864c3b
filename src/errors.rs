use crate::metrics;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

/// Message returned to clients for any storage failure.
pub const DATABASE_ERROR: &str = "Database error";

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        metrics::store_error(value.kind());
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: value.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error: {:#}", self.error);
        sentry::integrations::anyhow::capture_anyhow(&self.error);
        let body = ErrorBody {
            error: DATABASE_ERROR.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}
