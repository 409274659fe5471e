//! Application state management
//!
//! Author: hephaex@gmail.com

use insight_analytics::PredictionService;
use insight_core::AppConfig;
use insight_rag::RagOrchestrator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Application state shared across handlers
///
/// The prediction service and the RAG orchestrator load their models on
/// first use, at most once.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Churn model
    pub predictor: PredictionService,
    /// Question answering over the indexed documents
    pub rag: RagOrchestrator,
}

impl AppState {
    /// Create state wired from configuration
    pub fn new(config: AppConfig) -> Self {
        let predictor = PredictionService::from_paths(&config.paths);
        let rag = RagOrchestrator::from_config(&config);
        Self::with_services(config, predictor, rag)
    }

    /// Create state around prebuilt services
    pub fn with_services(config: AppConfig, predictor: PredictionService, rag: RagOrchestrator) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            predictor,
            rag,
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
