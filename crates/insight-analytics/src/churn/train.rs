//! Churn model training

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use insight_core::{InsightError, Result};

use super::encode::{one_hot_encode, EncodedFrame};
use super::gbdt::{GbdtClassifier, GbdtParams, SparseRow};
use super::ModelArtifacts;
use crate::store::{SalesStore, Table, Value};

/// Table holding raw churn rows
pub const CHURN_TABLE: &str = "churn";

/// Identifier column, not a feature
pub const ID_COLUMN: &str = "customerID";

pub const LABEL_COLUMN: &str = "Churn";

/// Seed of the train/test shuffle
pub const SPLIT_SEED: u64 = 42;

pub const TEST_FRACTION: f64 = 0.2;

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub features: usize,
    /// Share of test rows classified correctly at 0.5
    pub accuracy: f64,
    /// ROC AUC on the test rows, absent when they hold a single class
    pub auc: Option<f64>,
}

/// Train the churn classifier from the `churn` table and persist it
pub async fn train_churn_model(store: &SalesStore, artifacts: &ModelArtifacts) -> Result<TrainReport> {
    train(store, artifacts).await.map_err(|e| {
        tracing::error!(error = %e, "Churn model training failed");
        match e {
            InsightError::Training { .. } => e,
            other => InsightError::training_from(other),
        }
    })
}

async fn train(store: &SalesStore, artifacts: &ModelArtifacts) -> Result<TrainReport> {
    if !store.table_exists(CHURN_TABLE).await? {
        return Err(InsightError::missing("Churn table", "ingest"));
    }
    let table = store.read_table(CHURN_TABLE).await?;
    let (frame, labels) = prepare(&table)?;

    let (train_idx, test_idx) = split_indices(labels.len(), SPLIT_SEED);
    if train_idx.is_empty() {
        return Err(InsightError::training(format!(
            "not enough rows to train: {}",
            labels.len()
        )));
    }

    let train_rows: Vec<SparseRow> = train_idx.iter().map(|&i| frame.rows[i].clone()).collect();
    let train_labels: Vec<f64> = train_idx.iter().map(|&i| labels[i]).collect();
    let width = frame.width();

    tracing::info!(
        train_rows = train_rows.len(),
        test_rows = test_idx.len(),
        features = width,
        "Fitting churn model"
    );
    let model = tokio::task::spawn_blocking(move || {
        GbdtClassifier::fit(&train_rows, &train_labels, width, GbdtParams::default())
    })
    .await
    .map_err(|e| InsightError::training(format!("Training task failed: {e}")))??;

    let scores: Vec<f64> = test_idx
        .iter()
        .map(|&i| model.predict_proba(&frame.rows[i]))
        .collect();
    let test_labels: Vec<f64> = test_idx.iter().map(|&i| labels[i]).collect();

    let report = TrainReport {
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        features: width,
        accuracy: accuracy(&scores, &test_labels),
        auc: roc_auc(&scores, &test_labels),
    };
    tracing::info!(accuracy = report.accuracy, auc = ?report.auc, "Churn model evaluated");

    artifacts.save(&model, &frame.columns).await?;
    Ok(report)
}

/// Split a churn table into encoded features and 0/1 labels
pub fn prepare(table: &Table) -> Result<(EncodedFrame, Vec<f64>)> {
    let label_idx = table.column_index(LABEL_COLUMN).ok_or_else(|| {
        InsightError::training(format!("column {LABEL_COLUMN} missing from table {}", table.name))
    })?;

    let labels = table
        .rows
        .iter()
        .map(|row| match &row[label_idx] {
            Value::Text(s) if s == "Yes" => Ok(1.0),
            Value::Text(s) if s == "No" => Ok(0.0),
            other => Err(InsightError::training(format!(
                "unexpected {LABEL_COLUMN} value {other:?}"
            ))),
        })
        .collect::<Result<Vec<f64>>>()?;

    let keep: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != ID_COLUMN && name.as_str() != LABEL_COLUMN)
        .map(|(i, _)| i)
        .collect();
    let columns: Vec<String> = keep.iter().map(|&i| table.columns[i].clone()).collect();
    let rows: Vec<Vec<Value>> = table
        .rows
        .iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();

    Ok((one_hot_encode(&columns, &rows), labels))
}

/// Shuffled row indices: `ceil(n * TEST_FRACTION)` test rows, the rest train
pub fn split_indices(n: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = (n as f64 * TEST_FRACTION).ceil() as usize;
    let train = indices.split_off(n_test.min(n));
    (train, indices)
}

fn accuracy(scores: &[f64], labels: &[f64]) -> f64 {
    if scores.is_empty() {
        return f64::NAN;
    }
    let correct = scores
        .iter()
        .zip(labels)
        .filter(|(p, y)| (if **p > 0.5 { 1.0 } else { 0.0 }) == **y)
        .count();
    correct as f64 / scores.len() as f64
}

/// Rank-based ROC AUC with tied scores sharing their average rank
fn roc_auc(scores: &[f64], labels: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1.0).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            ranks[i] = rank;
        }
        start = end + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, y)| **y == 1.0)
        .map(|(r, _)| r)
        .sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}
