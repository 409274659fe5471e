//! Insight CLI - Command-line interface
//!
//! Usage:
//!   insight ingest
//!   insight index
//!   insight kpis
//!   insight train
//!   insight predict '{"tenure": 3, "Contract": "Month-to-month"}'
//!   insight ask "How did sales do in Q1?"

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use insight_analytics::{
    compute_kpis_at, ingest_raw_dir, train_churn_model, ModelArtifacts, PredictionService,
    SalesStore,
};
use insight_core::{telemetry::init_logging, AppConfig};
use insight_rag::{build_index, IndexTargets, RagOrchestrator};
use insight_vector::create_embedding_client;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Sales insights: KPIs, churn prediction and document Q&A")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding raw CSVs, documents, the database and the index
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory holding the churn model artifacts
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the raw CSV files into the database
    Ingest,
    /// Build the document vector index
    Index,
    /// Compute and store the sales KPIs
    Kpis,
    /// Train the churn model
    Train,
    /// Score one customer record given as a JSON object
    Predict {
        /// Customer record
        record: String,
    },
    /// Answer a question from the indexed documents
    Ask {
        /// Question to ask
        question: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.set_data_dir(dir);
    }
    if let Some(dir) = &cli.models_dir {
        config.paths.set_models_dir(dir);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Ingest => {
            let store = SalesStore::create(&config.paths.database).await?;
            let report = ingest_raw_dir(&config.paths.raw_dir, &store).await;
            store.close().await;
            let report = report?;

            for table in &report.tables {
                println!("{} -> {} ({} rows)", table.source, table.table, table.rows);
            }
            for file in &report.skipped {
                println!("{file}: not found, skipped");
            }
        }
        Commands::Index => {
            let embedder = create_embedding_client(&config.embedding);
            let report = build_index(
                &IndexTargets::from_paths(&config.paths),
                config.rag.chunk_size,
                embedder.as_ref(),
            )
            .await?;
            println!(
                "Indexed {} chunks from {} documents ({} empty skipped)",
                report.chunks, report.documents, report.skipped
            );
        }
        Commands::Kpis => {
            for kpi in compute_kpis_at(&config.paths.database).await? {
                println!("{}\t{}", kpi.metric, kpi.value);
            }
        }
        Commands::Train => {
            let store = SalesStore::open_existing(&config.paths.database).await?;
            let report = train_churn_model(&store, &ModelArtifacts::from_paths(&config.paths)).await;
            store.close().await;
            println!("{}", serde_json::to_string_pretty(&report?)?);
        }
        Commands::Predict { record } => {
            let record: serde_json::Value =
                serde_json::from_str(&record).context("record must be a JSON object")?;
            let churn_prob = PredictionService::from_paths(&config.paths)
                .predict(&record)
                .await?;
            println!("{}", serde_json::json!({ "churn_prob": churn_prob }));
        }
        Commands::Ask { question } => {
            let answer = RagOrchestrator::from_config(&config).answer(&question).await?;
            println!("{answer}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict_with_global_flags() {
        let cli = Cli::try_parse_from([
            "insight",
            "predict",
            "{\"tenure\": 3}",
            "--data-dir",
            "/srv/insight",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/srv/insight")));
        match cli.command {
            Commands::Predict { record } => assert_eq!(record, "{\"tenure\": 3}"),
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["insight", "ask"]).is_err());
    }

    #[test]
    fn test_config_file_and_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insight.toml");
        std::fs::write(&path, "[rag]\ntop_k = 5\n").unwrap();
        let models = dir.path().join("m");

        let cli = Cli::try_parse_from([
            "insight",
            "--config",
            path.to_str().unwrap(),
            "--models-dir",
            models.to_str().unwrap(),
            "kpis",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.paths.model, models.join("churn_gbdt.json"));
        if std::env::var("RAG_TOP_K").is_err() {
            assert_eq!(config.rag.top_k, 5);
        }
    }
}
