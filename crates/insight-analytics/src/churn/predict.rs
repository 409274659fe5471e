//! Churn probability for single records

use std::sync::atomic::{AtomicUsize, Ordering};

use insight_core::{InsightError, PathsConfig, Result};
use tokio::sync::OnceCell;

use super::align::align_to_schema;
use super::encode::encode_record;
use super::gbdt::GbdtClassifier;
use super::ModelArtifacts;

struct LoadedModel {
    model: GbdtClassifier,
    features: Vec<String>,
}

/// Scores records against the persisted churn model
///
/// The model and feature list are read on the first prediction and kept for
/// the life of the service.
pub struct PredictionService {
    artifacts: ModelArtifacts,
    loaded: OnceCell<LoadedModel>,
    loads: AtomicUsize,
}

impl PredictionService {
    pub fn new(artifacts: ModelArtifacts) -> Self {
        Self {
            artifacts,
            loaded: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(ModelArtifacts::from_paths(paths))
    }

    /// Service over an in-memory model
    pub fn with_model(model: GbdtClassifier, features: Vec<String>) -> Self {
        Self {
            artifacts: ModelArtifacts::new("", ""),
            loaded: OnceCell::new_with(Some(LoadedModel { model, features })),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Number of times the artifacts have been read from disk
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Feature list the model was trained on
    pub async fn features(&self) -> Result<&[String]> {
        Ok(&self.ensure_loaded().await?.features)
    }

    async fn ensure_loaded(&self) -> Result<&LoadedModel> {
        self.loaded
            .get_or_try_init(|| async {
                tracing::info!(model = %self.artifacts.model_path.display(), "Loading churn model");
                self.loads.fetch_add(1, Ordering::AcqRel);
                let (model, features) = self.artifacts.load().await?;
                Ok::<_, InsightError>(LoadedModel { model, features })
            })
            .await
    }

    /// Positive-class probability for a JSON object record
    pub async fn predict(&self, record: &serde_json::Value) -> Result<f64> {
        self.predict_inner(record).await.map_err(|e| {
            tracing::error!(error = %e, "Prediction failed");
            e
        })
    }

    async fn predict_inner(&self, record: &serde_json::Value) -> Result<f64> {
        let object = record
            .as_object()
            .ok_or_else(|| InsightError::Prediction("input must be a JSON object".to_string()))?;
        let loaded = self.ensure_loaded().await?;

        let encoded = encode_record(object)?;
        let row = align_to_schema(&encoded, &loaded.features);
        let probability = loaded.model.predict_proba(row.as_slice());

        tracing::debug!(probability, "Scored record");
        Ok(probability)
    }
}
