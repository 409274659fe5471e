//! API error handling
//!
//! Every domain failure becomes a 500 carrying its message; there are no
//! structured error codes.
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use insight_core::InsightError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    #[schema(example = "Churn model not found. Run `insight train` first.")]
    pub detail: String,
}

/// Application error type
#[derive(Debug)]
pub struct AppError(pub InsightError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = ?self.0.kind(), error = %self.0, "Request failed");
        let body = ErrorResponse {
            detail: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<InsightError> for AppError {
    fn from(err: InsightError) -> Self {
        AppError(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError(InsightError::Other(err))
    }
}
