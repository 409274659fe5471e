//! SQLite relational store
//!
//! Tables are read back dynamically typed, the way they were ingested.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use insight_core::{InsightError, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};

pub(crate) fn db_error(context: &str, e: sqlx::Error) -> InsightError {
    InsightError::Database(format!("{context}: {e}"))
}

/// Quote an identifier for use in SQL text
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// Dynamic values
// ============================================================================

/// One cell of a stored table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell; `None` for NULL and text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            Self::Null | Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// Column definition used when (re)creating a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A table read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of a column, top to bottom
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Store
// ============================================================================

/// Handle to the application database
#[derive(Clone)]
pub struct SalesStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SalesStore {
    /// Open the database for writing, creating the file and its directory
    pub async fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                InsightError::Database(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        Self::connect(path, true).await
    }

    /// Open an existing database; absence means ingestion has not run
    pub async fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::error!(path = %path.display(), "Database not found");
            return Err(InsightError::missing("Database", "ingest"));
        }
        Self::connect(path, false).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| db_error("Invalid connection string", e))?;
        // The database lives only as long as its single connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("SQLite connection failed", e))?;
        Ok(Self { pool, path: None })
    }

    async fn connect(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("SQLite connection failed", e))?;

        tracing::debug!(path = %path.display(), "Opened database");
        Ok(Self {
            pool,
            path: Some(path.to_path_buf()),
        })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Names of all tables, sorted
    pub async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list tables", e))
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to look up table", e))?;
        Ok(count > 0)
    }

    async fn column_names(&self, name: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(name));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read table schema", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("name")
                    .map_err(|e| db_error("Failed to read column name", e))
            })
            .collect()
    }

    /// Read a whole table
    pub async fn read_table(&self, name: &str) -> Result<Table> {
        let columns = self.column_names(name).await?;
        if columns.is_empty() {
            return Err(InsightError::Database(format!("no such table: {name}")));
        }

        let sql = format!("SELECT * FROM {}", quote_ident(name));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read table", e))?;

        let rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
            .collect::<Result<Vec<Vec<Value>>>>()?;

        tracing::debug!(table = name, rows = rows.len(), "Read table");
        Ok(Table {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Drop `name` if present, recreate it and insert `rows`
    ///
    /// Every row must have one value per column.
    pub async fn replace_table(
        &self,
        name: &str,
        columns: &[ColumnDef],
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        if columns.is_empty() {
            return Err(InsightError::Database(format!(
                "table {name} needs at least one column"
            )));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(InsightError::Database(format!(
                "row {bad} has {} values, table {name} has {} columns",
                rows[bad].len(),
                columns.len()
            )));
        }

        let table = quote_ident(name);
        let defs = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        let names = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let drop_sql = format!("DROP TABLE IF EXISTS {table}");
        let create_sql = format!("CREATE TABLE {table} ({defs})");
        let insert_sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(&drop_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to drop table", e))?;
        sqlx::query(&create_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        for row in rows {
            let mut query = sqlx::query(&insert_sql);
            for value in row {
                query = match value {
                    Value::Null => query.bind(None::<i64>),
                    Value::Integer(i) => query.bind(*i),
                    Value::Real(r) => query.bind(*r),
                    Value::Text(s) => query.bind(s.as_str()),
                };
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to insert row", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit", e))?;

        tracing::debug!(table = name, rows = rows.len(), "Replaced table");
        Ok(rows.len())
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_cell(row: &SqliteRow, i: usize) -> Result<Value> {
    let type_name = {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| db_error("Failed to read cell", e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match type_name.as_str() {
        "INTEGER" => row.try_get::<i64, _>(i).map(Value::Integer),
        "REAL" => row.try_get::<f64, _>(i).map(Value::Real),
        "TEXT" => row.try_get::<String, _>(i).map(Value::Text),
        other => {
            return Err(InsightError::Database(format!(
                "unsupported stored type {other}"
            )))
        }
    };
    value.map_err(|e| db_error("Failed to decode cell", e))
}
