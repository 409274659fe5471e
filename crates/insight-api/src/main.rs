//! Insight API Server
//!
//! Configuration comes from the environment, or from the TOML file named by
//! `INSIGHT_CONFIG` with environment overrides on top.
//!
//! Author: hephaex@gmail.com

use insight_api::{create_router, state::AppState};
use insight_core::{telemetry::init_logging, AppConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("INSIGHT_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    init_logging(&config.logging)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        generator = %config.generator.backend,
        database = %config.paths.database.display(),
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Sales Insights API starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
