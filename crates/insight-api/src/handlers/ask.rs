//! Question answering handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

/// Query string of `/ask`
#[derive(Debug, Deserialize, IntoParams)]
pub struct AskParams {
    /// Question about the indexed documents
    pub query: String,
}

/// Answer response body
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// Generated answer, verbatim
    pub answer: String,
}

/// Answer a question from the document index
#[utoipa::path(
    get,
    path = "/ask",
    tag = "rag",
    params(AskParams),
    responses(
        (status = 200, description = "Answer generated", body = AskResponse),
        (status = 500, description = "Retrieval or generation failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    tracing::info!(query_chars = params.query.len(), "Question received");

    let answer = state.rag.answer(&params.query).await?;
    Ok(Json(AskResponse { answer }))
}
