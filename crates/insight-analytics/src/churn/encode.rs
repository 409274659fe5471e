//! One-hot encoding of mixed-type tables and training records

use std::collections::{BTreeSet, HashMap};

use insight_core::{InsightError, Result};

use super::gbdt::SparseRow;
use crate::store::Value;

/// Encoded feature matrix
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Feature names in column order
    pub columns: Vec<String>,
    pub rows: Vec<SparseRow>,
}

impl EncodedFrame {
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

/// Indicator column name for `value` of `column`
pub fn indicator_name(column: &str, value: &str) -> String {
    format!("{column}_{value}")
}

/// Label of a categorical cell; NULL has none
fn category(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s.clone()),
    }
}

/// Encode a table the way dataframe "get dummies" does
///
/// Columns holding any text are categorical, the rest numeric. Numeric
/// columns come first in table order, followed by one indicator per distinct
/// value of each categorical column, values sorted. NULL numeric cells
/// encode as zero; NULL categorical cells set no indicator.
pub fn one_hot_encode(columns: &[String], rows: &[Vec<Value>]) -> EncodedFrame {
    let categorical: Vec<bool> = (0..columns.len())
        .map(|c| rows.iter().any(|row| matches!(row[c], Value::Text(_))))
        .collect();

    let mut names = Vec::new();
    let mut numeric_slots = Vec::new();
    for (c, name) in columns.iter().enumerate() {
        if !categorical[c] {
            numeric_slots.push((c, names.len()));
            names.push(name.clone());
        }
    }

    // (column, value) -> feature index
    let mut indicator_slots: HashMap<(usize, String), usize> = HashMap::new();
    for (c, name) in columns.iter().enumerate() {
        if !categorical[c] {
            continue;
        }
        let values: BTreeSet<String> = rows.iter().filter_map(|row| category(&row[c])).collect();
        for value in values {
            indicator_slots.insert((c, value.clone()), names.len());
            names.push(indicator_name(name, &value));
        }
    }

    let encoded = rows
        .iter()
        .map(|row| {
            let numeric = numeric_slots.iter().map(|&(c, slot)| {
                let value = row[c].as_f64().filter(|v| !v.is_nan()).unwrap_or(0.0);
                (slot, value)
            });
            let indicators = columns.iter().enumerate().filter_map(|(c, _)| {
                if !categorical[c] {
                    return None;
                }
                let value = category(&row[c])?;
                indicator_slots.get(&(c, value)).map(|&slot| (slot, 1.0))
            });
            SparseRow::from_entries(numeric.chain(indicators))
        })
        .collect();

    EncodedFrame {
        columns: names,
        rows: encoded,
    }
}

/// Encode one free-form JSON record
///
/// Numbers pass through under their key, booleans become 1 or 0, strings set
/// the `"{key}_{value}"` indicator and nulls are left out.
pub fn encode_record(record: &serde_json::Map<String, serde_json::Value>) -> Result<HashMap<String, f64>> {
    let mut encoded = HashMap::with_capacity(record.len());
    for (key, value) in record {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Bool(b) => {
                encoded.insert(key.clone(), if *b { 1.0 } else { 0.0 });
            }
            serde_json::Value::Number(n) => {
                let number = n.as_f64().ok_or_else(|| {
                    InsightError::Prediction(format!("value of {key} is not representable"))
                })?;
                encoded.insert(key.clone(), number);
            }
            serde_json::Value::String(s) => {
                encoded.insert(indicator_name(key, s), 1.0);
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(InsightError::Prediction(format!(
                    "unsupported nested value for {key}"
                )));
            }
        }
    }
    Ok(encoded)
}
