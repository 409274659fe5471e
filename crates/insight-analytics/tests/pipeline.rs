//! End-to-end: raw CSV files → tables → KPIs

use insight_analytics::{compute_kpis_at, ingest_raw_dir, SalesStore, Value};

#[tokio::test]
async fn test_ingest_then_kpis() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    std::fs::create_dir(&raw).unwrap();
    std::fs::write(
        raw.join("superstore.csv"),
        "Order ID,Sales,Discount\n1,100,0.1\n2,200,0.0",
    )
    .unwrap();
    std::fs::write(raw.join("telco_churn.csv"), "customerID,Churn\n1,No").unwrap();

    let db_path = dir.path().join("sales_insights.db");
    let store = SalesStore::create(&db_path).await.unwrap();
    let report = ingest_raw_dir(&raw, &store).await.unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.tables.len(), 2);

    let tables = store.table_names().await.unwrap();
    assert!(tables.contains(&"superstore".to_string()));
    assert!(tables.contains(&"churn".to_string()));
    store.close().await;

    let kpis = compute_kpis_at(&db_path).await.unwrap();
    let metrics: Vec<(&str, f64)> = kpis.iter().map(|k| (k.metric.as_str(), k.value)).collect();
    assert_eq!(metrics[0], ("total_sales", 300.0));
    assert_eq!(metrics[1].0, "avg_discount");
    assert!((metrics[1].1 - 0.05).abs() < 1e-12);
    assert_eq!(metrics[2], ("orders", 2.0));

    let store = SalesStore::open_existing(&db_path).await.unwrap();
    let stored = store.read_table("kpis").await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.rows[0][1], Value::Real(300.0));

    let churn = store.read_table("churn").await.unwrap();
    assert_eq!(churn.columns, vec!["customerID", "Churn"]);
    assert_eq!(
        churn.rows,
        vec![vec![Value::Integer(1), Value::Text("No".into())]]
    );
}

#[tokio::test]
async fn test_kpis_before_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let err = compute_kpis_at(&dir.path().join("sales_insights.db"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Run `insight ingest` first"));
}
