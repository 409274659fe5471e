//! Churn prediction handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Arbitrary customer record, keyed by column name
#[derive(Debug, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(example = json!({"tenure": 3, "Contract": "Month-to-month", "MonthlyCharges": 70.35}))]
pub struct CustomerRecord(
    #[schema(value_type = Object)] pub serde_json::Map<String, serde_json::Value>,
);

/// Prediction response body
#[derive(Debug, Serialize, ToSchema)]
pub struct PredictResponse {
    /// Probability that the customer churns
    #[schema(example = 0.73)]
    pub churn_prob: f64,
}

/// Score a customer record against the churn model
#[utoipa::path(
    post,
    path = "/predict",
    tag = "analytics",
    request_body = CustomerRecord,
    responses(
        (status = 200, description = "Record scored", body = PredictResponse),
        (status = 500, description = "Model missing or prediction failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(record): Json<CustomerRecord>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let churn_prob = state
        .predictor
        .predict(&serde_json::Value::Object(record.0))
        .await?;
    Ok(Json(PredictResponse { churn_prob }))
}
