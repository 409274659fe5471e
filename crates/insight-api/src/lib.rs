//! Insight API - REST server
//!
//! Serves the KPIs, churn predictions and document question answering over
//! HTTP.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use handlers::{ask, health, kpis, predict};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Insights API",
        description = "KPIs, churn prediction and document Q&A",
        license(name = "Apache-2.0")
    ),
    paths(
        health::health_check,
        kpis::get_kpis,
        predict::predict,
        ask::ask,
    ),
    components(schemas(
        health::HealthResponse,
        kpis::KpiResponse,
        predict::CustomerRecord,
        predict::PredictResponse,
        ask::AskResponse,
        error::ErrorResponse,
    )),
    tags(
        (name = "health", description = "Service status"),
        (name = "analytics", description = "KPIs and churn prediction"),
        (name = "rag", description = "Question answering over the document index")
    )
)]
pub struct ApiDoc;

// ============================================================================
// Router
// ============================================================================

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/kpis", get(kpis::get_kpis))
        .route("/predict", post(predict::predict))
        .route("/ask", get(ask::ask))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy; an empty origin list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
