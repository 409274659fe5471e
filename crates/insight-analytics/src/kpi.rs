//! KPI engine
//!
//! Aggregates the whole sales table, no filtering or grouping, and replaces
//! the `kpis` table with the result.

use std::path::Path;

use insight_core::{InsightError, KpiRecord, Result, KPI_AVG_DISCOUNT, KPI_ORDERS, KPI_TOTAL_SALES};

use crate::store::{ColumnDef, ColumnType, SalesStore, Table, Value};

/// Table holding raw sales rows
pub const SALES_TABLE: &str = "superstore";

/// Table the KPI rows are written to
pub const KPI_TABLE: &str = "kpis";

pub const SALES_COLUMN: &str = "Sales";
pub const DISCOUNT_COLUMN: &str = "Discount";

/// Open the database at `path` and compute the KPIs
pub async fn compute_kpis_at(path: &Path) -> Result<Vec<KpiRecord>> {
    let store = SalesStore::open_existing(path).await?;
    let result = compute_kpis(&store).await;
    store.close().await;
    result
}

/// Compute the KPIs and store them, replacing any previous run
pub async fn compute_kpis(store: &SalesStore) -> Result<Vec<KpiRecord>> {
    if !store.table_exists(SALES_TABLE).await? {
        tracing::error!(table = SALES_TABLE, "Sales table not found");
        return Err(InsightError::missing("Sales table", "ingest"));
    }

    let table = store.read_table(SALES_TABLE).await?;
    let kpis = summarize(&table).map_err(|e| {
        tracing::error!(error = %e, "KPI computation failed");
        e
    })?;

    let columns = [
        ColumnDef::new("metric", ColumnType::Text),
        ColumnDef::new("value", ColumnType::Real),
    ];
    let rows: Vec<Vec<Value>> = kpis
        .iter()
        .map(|k| vec![Value::Text(k.metric.clone()), Value::Real(k.value)])
        .collect();
    store.replace_table(KPI_TABLE, &columns, &rows).await?;

    tracing::info!(
        total_sales = kpis[0].value,
        avg_discount = kpis[1].value,
        orders = kpis[2].value,
        "KPIs computed"
    );
    Ok(kpis)
}

/// Sales sum, discount mean and row count of a sales table
///
/// NULL cells are skipped; a mean over no values is NaN.
pub fn summarize(table: &Table) -> Result<Vec<KpiRecord>> {
    let sales = numeric_column(table, SALES_COLUMN)?;
    let discounts = numeric_column(table, DISCOUNT_COLUMN)?;

    let total_sales: f64 = sales.iter().sum();
    let avg_discount = if discounts.is_empty() {
        f64::NAN
    } else {
        discounts.iter().sum::<f64>() / discounts.len() as f64
    };

    Ok(vec![
        KpiRecord::new(KPI_TOTAL_SALES, total_sales),
        KpiRecord::new(KPI_AVG_DISCOUNT, avg_discount),
        KpiRecord::new(KPI_ORDERS, table.len() as f64),
    ])
}

fn numeric_column(table: &Table, name: &str) -> Result<Vec<f64>> {
    let cells = table.column(name).ok_or_else(|| {
        InsightError::Analytics(format!("column {name} missing from table {}", table.name))
    })?;

    let mut values = Vec::new();
    for cell in cells {
        match cell {
            Value::Null => {}
            Value::Text(s) => {
                return Err(InsightError::Analytics(format!(
                    "non-numeric value {s:?} in column {name}"
                )))
            }
            other => values.extend(other.as_f64()),
        }
    }
    Ok(values)
}
