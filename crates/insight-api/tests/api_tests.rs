//! API Integration Tests
//!
//! The router is driven in-process; models are small in-memory stand-ins.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use insight_analytics::churn::SparseRow;
use insight_analytics::{GbdtClassifier, GbdtParams, PredictionService, SalesStore};
use insight_api::{create_router, state::AppState};
use insight_core::{AppConfig, DocumentChunk, InsightError, PathsConfig, Result, TextGenerator};
use insight_rag::{RagOrchestrator, Retriever};
use insight_vector::{EmbeddingClient, IndexedCorpus};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

// =============================================================================
// Test doubles
// =============================================================================

struct KeywordEmbedding;

impl KeywordEmbedding {
    const KEYWORDS: [&'static str; 3] = ["sales", "churn", "returns"];

    fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn name(&self) -> &str {
        "keywords"
    }
}

struct FixedGenerator(std::result::Result<&'static str, &'static str>);

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.0
            .map(str::to_string)
            .map_err(InsightError::rag)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths = PathsConfig::rooted(root.join("data"), root.join("models"));
    config
}

fn orchestrator(reply: std::result::Result<&'static str, &'static str>) -> RagOrchestrator {
    let chunks = vec![
        DocumentChunk::new("q1.txt", 0, "Q1 sales grew 12%"),
        DocumentChunk::new("churn.txt", 0, "churn fell in March"),
    ];
    let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| KeywordEmbedding::vector(&c.text)).collect();
    let corpus = IndexedCorpus::from_parts(&vectors, chunks).unwrap();
    let retriever = Retriever::with_corpus(corpus, Arc::new(KeywordEmbedding));
    RagOrchestrator::new(retriever, Arc::new(FixedGenerator(reply)))
}

fn churn_model() -> (GbdtClassifier, Vec<String>) {
    let rows: Vec<SparseRow> = (0..30)
        .map(|i| SparseRow::from_entries(vec![(0, i as f64), (1 + i % 2, 1.0)]))
        .collect();
    let labels: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
    let model = GbdtClassifier::fit(&rows, &labels, 3, GbdtParams::default()).unwrap();
    let features = vec![
        "tenure".to_string(),
        "Contract_Month-to-month".to_string(),
        "Contract_Two year".to_string(),
    ];
    (model, features)
}

fn test_state(root: &Path) -> Arc<AppState> {
    let (model, features) = churn_model();
    Arc::new(AppState::with_services(
        config(root),
        PredictionService::with_model(model, features),
        orchestrator(Ok("Sales grew 12% in Q1.")),
    ))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(create_router(test_state(dir.path())), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["model_loaded"], true);
}

#[tokio::test]
async fn test_request_counter() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    send(create_router(state.clone()), get("/ask?query=sales")).await;
    send(create_router(state.clone()), get("/kpis")).await;

    let (_, json) = send(create_router(state), get("/health")).await;
    assert_eq!(json["total_requests"], 2);
}

#[tokio::test]
async fn test_openapi_document() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        create_router(test_state(dir.path())),
        get("/api-docs/openapi.json"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    for path in ["/health", "/kpis", "/predict", "/ask"] {
        assert!(json["paths"][path].is_object(), "missing {path}");
    }
}

// =============================================================================
// KPIs
// =============================================================================

#[tokio::test]
async fn test_kpis_before_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(create_router(test_state(dir.path())), get("/kpis")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json["detail"],
        "Database not found. Run `insight ingest` first."
    );
}

#[tokio::test]
async fn test_kpis_after_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let raw = dir.path().join("raw");
    std::fs::create_dir(&raw).unwrap();
    std::fs::write(
        raw.join("superstore.csv"),
        "Order ID,Sales,Discount\n1,100,0.1\n2,200,0.0",
    )
    .unwrap();

    let store = SalesStore::create(&state.config.paths.database).await.unwrap();
    insight_analytics::ingest_raw_dir(&raw, &store).await.unwrap();
    store.close().await;

    let response = create_router(state).oneshot(get("/kpis")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("{\"total_sales\":300.0,\"avg_discount\":"));

    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["orders"], 2.0);
    assert!((json["avg_discount"].as_f64().unwrap() - 0.05).abs() < 1e-12);
}

// =============================================================================
// Prediction
// =============================================================================

#[tokio::test]
async fn test_predict_returns_probability() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        create_router(test_state(dir.path())),
        post_json("/predict", json!({"Contract": "Month-to-month", "gender": "Female"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let p = json["churn_prob"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&p));
    assert!(p > 0.5);
}

#[tokio::test]
async fn test_predict_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let state = Arc::new(AppState::with_services(
        config.clone(),
        PredictionService::from_paths(&config.paths),
        orchestrator(Ok("unused")),
    ));

    let (status, json) = send(create_router(state), post_json("/predict", json!({"tenure": 1}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json["detail"],
        "Churn model not found. Run `insight train` first."
    );
}

// =============================================================================
// Question answering
// =============================================================================

#[tokio::test]
async fn test_ask_returns_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        create_router(test_state(dir.path())),
        get("/ask?query=How%20did%20sales%20do%3F"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"answer": "Sales grew 12% in Q1."}));
}

#[tokio::test]
async fn test_ask_generation_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (model, features) = churn_model();
    let state = Arc::new(AppState::with_services(
        config(dir.path()),
        PredictionService::with_model(model, features),
        orchestrator(Err("ollama exited with status 1")),
    ));

    let (status, json) = send(create_router(state), get("/ask?query=churn")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["detail"], "RAG error: ollama exited with status 1");
}

#[tokio::test]
async fn test_ask_without_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let retriever = Retriever::new(
        &config.paths.index,
        &config.paths.metadata,
        Arc::new(KeywordEmbedding),
    );
    let (model, features) = churn_model();
    let state = Arc::new(AppState::with_services(
        config,
        PredictionService::with_model(model, features),
        RagOrchestrator::new(retriever, Arc::new(FixedGenerator(Ok("unused")))),
    ));

    let (status, json) = send(create_router(state), get("/ask?query=sales")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"]
        .as_str()
        .unwrap()
        .contains("Run `insight index` first"));
}

#[tokio::test]
async fn test_ask_requires_query() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_router(test_state(dir.path()))
        .oneshot(get("/ask"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
