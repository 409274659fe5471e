//! Schema alignment between training and inference

use std::collections::HashMap;

/// Reindex an encoded record to the training feature list
///
/// The output has exactly one value per schema column, in schema order.
/// Columns the record lacks are 0.0; record columns outside the schema are
/// dropped.
pub fn align_to_schema(encoded: &HashMap<String, f64>, schema: &[String]) -> Vec<f64> {
    let dropped = encoded.keys().filter(|k| !schema.contains(k)).count();
    if dropped > 0 {
        tracing::debug!(dropped, "Ignoring columns unknown to the model");
    }

    schema
        .iter()
        .map(|column| encoded.get(column).copied().unwrap_or(0.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_missing_columns_filled_with_zero() {
        let encoded = HashMap::from([("A".to_string(), 4.0)]);
        assert_eq!(
            align_to_schema(&encoded, &schema(&["A", "B", "C"])),
            vec![4.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_unknown_columns_dropped() {
        let encoded = HashMap::from([
            ("B".to_string(), 1.0),
            ("Z".to_string(), 9.0),
        ]);
        assert_eq!(
            align_to_schema(&encoded, &schema(&["A", "B"])),
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn test_output_follows_schema_order() {
        let encoded = HashMap::from([
            ("C".to_string(), 3.0),
            ("A".to_string(), 1.0),
            ("B".to_string(), 2.0),
        ]);
        assert_eq!(
            align_to_schema(&encoded, &schema(&["B", "C", "A"])),
            vec![2.0, 3.0, 1.0]
        );
    }

    #[test]
    fn test_empty_schema() {
        let encoded = HashMap::from([("A".to_string(), 1.0)]);
        assert!(align_to_schema(&encoded, &[]).is_empty());
    }
}
