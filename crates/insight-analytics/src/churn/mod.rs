//! Churn model: training and prediction
//!
//! The model and its ordered feature list are persisted as two JSON files.

pub mod align;
pub mod encode;
pub mod gbdt;
pub mod predict;
pub mod train;

pub use align::align_to_schema;
pub use encode::{encode_record, one_hot_encode, EncodedFrame};
pub use gbdt::{FeatureLookup, GbdtClassifier, GbdtParams, SparseRow};
pub use predict::PredictionService;
pub use train::{train_churn_model, TrainReport};

use std::path::{Path, PathBuf};

use insight_core::{InsightError, PathsConfig, Result};

/// Locations of the persisted model and feature list
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub model_path: PathBuf,
    pub features_path: PathBuf,
}

impl ModelArtifacts {
    pub fn new(model_path: impl Into<PathBuf>, features_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            features_path: features_path.into(),
        }
    }

    pub fn from_paths(paths: &PathsConfig) -> Self {
        Self::new(&paths.model, &paths.features)
    }

    pub fn exist(&self) -> bool {
        self.model_path.is_file() && self.features_path.is_file()
    }

    /// Write both files, creating their directories
    pub async fn save(&self, model: &GbdtClassifier, features: &[String]) -> Result<()> {
        let features_json = serde_json::to_string_pretty(features)
            .map_err(|e| InsightError::training(format!("Failed to serialize features: {e}")))?;
        write_file(&self.model_path, model.to_json()?).await?;
        write_file(&self.features_path, features_json).await?;

        tracing::info!(
            model = %self.model_path.display(),
            features = %self.features_path.display(),
            "Saved churn model"
        );
        Ok(())
    }

    /// Read both files back
    pub async fn load(&self) -> Result<(GbdtClassifier, Vec<String>)> {
        if !self.exist() {
            return Err(InsightError::missing("Churn model", "train"));
        }

        let model_json = read_file(&self.model_path).await?;
        let features_json = read_file(&self.features_path).await?;
        let model = GbdtClassifier::from_json(&model_json)?;
        let features: Vec<String> = serde_json::from_str(&features_json)
            .map_err(|e| InsightError::Prediction(format!("Invalid feature list: {e}")))?;

        if model.n_features() != features.len() {
            return Err(InsightError::Prediction(format!(
                "model expects {} features, feature list has {}",
                model.n_features(),
                features.len()
            )));
        }
        Ok((model, features))
    }
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(InsightError::training_from)?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(InsightError::training_from)
}

async fn read_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InsightError::Prediction(format!("Failed to read {}: {e}", path.display())))
}
