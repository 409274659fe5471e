//! KPI handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use insight_core::KpiRecord;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use utoipa::ToSchema;

/// Metric name to value, in computation order
#[derive(Debug, ToSchema)]
#[schema(example = json!({"total_sales": 300.0, "avg_discount": 0.05, "orders": 2.0}))]
pub struct KpiResponse(#[schema(value_type = Object)] pub Vec<KpiRecord>);

impl Serialize for KpiResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for kpi in &self.0 {
            map.serialize_entry(&kpi.metric, &kpi.value)?;
        }
        map.end()
    }
}

/// Recompute the KPIs from the sales table
#[utoipa::path(
    get,
    path = "/kpis",
    tag = "analytics",
    responses(
        (status = 200, description = "KPIs computed", body = KpiResponse),
        (status = 500, description = "Database missing or computation failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_kpis(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let kpis = insight_analytics::compute_kpis_at(&state.config.paths.database).await?;
    Ok(Json(KpiResponse(kpis)))
}
