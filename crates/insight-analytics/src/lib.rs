//! Insight Analytics - Tabular side of the pipeline
//!
//! - CSV ingestion into SQLite
//! - KPI engine over the sales table
//! - Churn classifier training and prediction
//!
//! Author: hephaex@gmail.com

pub mod churn;
pub mod ingest;
pub mod kpi;
pub mod store;

pub use churn::{
    align_to_schema, train_churn_model, GbdtClassifier, GbdtParams, ModelArtifacts,
    PredictionService, TrainReport,
};
pub use ingest::{ingest_csv_to_table, ingest_raw_dir, IngestReport, IngestedTable};
pub use kpi::{compute_kpis, compute_kpis_at};
pub use store::{ColumnDef, ColumnType, SalesStore, Table, Value};
