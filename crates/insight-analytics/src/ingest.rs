//! CSV ingestion into the relational store

use std::path::Path;

use insight_core::{InsightError, Result};
use serde::Serialize;

use crate::store::{ColumnDef, ColumnType, SalesStore, Value};

/// Raw files picked up by [`ingest_raw_dir`] and the tables they land in
pub const RAW_FILES: &[(&str, &str)] = &[
    ("superstore.csv", "superstore"),
    ("telco_churn.csv", "churn"),
];

/// One ingested file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedTable {
    pub source: String,
    pub table: String,
    pub rows: usize,
}

/// Outcome of a raw-directory ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub tables: Vec<IngestedTable>,
    /// Expected files that were not present
    pub skipped: Vec<String>,
}

/// Load every known raw file in `raw_dir` into its table
pub async fn ingest_raw_dir(raw_dir: &Path, store: &SalesStore) -> Result<IngestReport> {
    if !raw_dir.is_dir() {
        tracing::error!(dir = %raw_dir.display(), "Raw data directory not found");
        return Err(InsightError::ingestion(format!(
            "Raw data directory not found: {}",
            raw_dir.display()
        )));
    }

    let mut report = IngestReport::default();
    for (file, table) in RAW_FILES {
        let path = raw_dir.join(file);
        if !path.is_file() {
            tracing::warn!(file = %path.display(), "Raw file missing, skipping");
            report.skipped.push(file.to_string());
            continue;
        }

        let rows = ingest_csv_to_table(&path, table, store).await?;
        report.tables.push(IngestedTable {
            source: file.to_string(),
            table: table.to_string(),
            rows,
        });
    }

    tracing::info!(
        tables = report.tables.len(),
        skipped = report.skipped.len(),
        "Ingestion finished"
    );
    Ok(report)
}

/// Replace `table` with the contents of the CSV file at `path`
///
/// Returns the number of rows written.
pub async fn ingest_csv_to_table(path: &Path, table: &str, store: &SalesStore) -> Result<usize> {
    match load_csv(path, table, store).await {
        Ok(rows) => {
            tracing::info!(file = %path.display(), table, rows, "Ingested CSV");
            Ok(rows)
        }
        Err(e) => {
            tracing::error!(file = %path.display(), table, error = %e, "Failed to ingest CSV");
            Err(match e {
                InsightError::Ingestion { .. } => e,
                other => InsightError::ingestion_from(other),
            })
        }
    }
}

async fn load_csv(path: &Path, table: &str, store: &SalesStore) -> Result<usize> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(InsightError::ingestion_from)?;
    let text = decode_text(bytes);
    let (columns, rows) = parse_csv(&text)?;
    store.replace_table(table, &columns, &rows).await
}

/// UTF-8 when valid, Latin-1 otherwise
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("File is not valid UTF-8, decoding as Latin-1");
            e.into_bytes().iter().map(|&b| char::from(b)).collect()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

/// Parse CSV text with a header row into typed columns and rows
pub fn parse_csv(text: &str) -> Result<(Vec<ColumnDef>, Vec<Vec<Value>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(InsightError::ingestion_from)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(InsightError::ingestion("CSV file has no header row"));
    }

    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(InsightError::ingestion_from)?;

    let types: Vec<ColumnType> = (0..headers.len())
        .map(|i| infer_column_type(records.iter().map(|r| r.get(i).unwrap_or(""))))
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            types
                .iter()
                .enumerate()
                .map(|(i, ty)| to_value(record.get(i).unwrap_or(""), *ty))
                .collect()
        })
        .collect();

    let columns = headers
        .into_iter()
        .zip(types)
        .map(|(name, ty)| ColumnDef::new(name, ty))
        .collect();
    Ok((columns, rows))
}

/// Narrowest storage class every non-empty cell fits
///
/// A column with no values at all is stored as REAL.
fn infer_column_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut ty = ColumnType::Integer;
    let mut seen = false;
    for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
        seen = true;
        if ty == ColumnType::Integer && cell.parse::<i64>().is_err() {
            ty = ColumnType::Real;
        }
        if ty == ColumnType::Real && cell.parse::<f64>().is_err() {
            return ColumnType::Text;
        }
    }
    if seen {
        ty
    } else {
        ColumnType::Real
    }
}

fn to_value(cell: &str, ty: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    let trimmed = cell.trim();
    match ty {
        ColumnType::Integer => trimmed
            .parse()
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        ColumnType::Real => trimmed.parse().map(Value::Real).unwrap_or(Value::Null),
        ColumnType::Text => Value::Text(cell.to_string()),
    }
}
