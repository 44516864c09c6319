//! Loglens main binary.
//!
//! Wires the external-service adapters, the stores, the real-time
//! pipeline and the batch clustering engine together and exposes them
//! through the REST API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loglens_adapters::{
    HttpClusteringBackend, HttpEmbeddingProvider, HttpLlmClient, HttpRedactor, HttpScoringBackend,
};
use loglens_api::{create_router, ApiConfig, AppState};
use loglens_clustering::{BatchClusteringEngine, CancelHandle, ClusteringRunParams, OutlierSweep};
use loglens_core::budget::BudgetGuard;
use loglens_core::cache::EmbeddingCache;
use loglens_core::config::Config;
use loglens_core::types::{LogLevel, LogRecord};
use loglens_detection::{FastScorer, RealTimePipeline, SemanticValidator};
use loglens_storage::{
    InMemoryClusterStore, InMemoryLogStore, InMemoryVectorStore, InMemoryVerdictStore,
};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Loglens CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "loglens", version, about = "Hybrid tiered log anomaly detection")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "LOGLENS_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "LOGLENS_LOG_JSON", global = true)]
    log_json: bool,

    #[clap(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the loglens service (default if no subcommand given)
    Serve,
    /// Run one batch clustering pass and print the summary
    Cluster {
        #[clap(long)]
        min_cluster_size: Option<usize>,

        #[clap(long)]
        min_samples: Option<usize>,

        #[clap(long)]
        sample_size: Option<usize>,

        /// Skip the outlier validation sweep
        #[clap(long)]
        skip_validation: bool,
    },
    /// Replay a log entry from a JSON file through the pipeline
    Submit {
        /// Log file path (JSON: {"message", "service", "level"})
        #[clap(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!("Starting loglens v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;

    let app = build_app(&config).context("failed to wire components")?;

    match cli.command {
        Some(Commands::Cluster {
            min_cluster_size,
            min_samples,
            sample_size,
            skip_validation,
        }) => {
            let params = ClusteringRunParams {
                min_cluster_size,
                min_samples,
                sample_size,
                skip_validation,
                ..Default::default()
            };
            let summary = app.engine.run(&params, &CancelHandle::new()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Some(Commands::Submit { file }) => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let parsed: serde_json::Value = serde_json::from_str(&raw)?;

            let record = LogRecord::new(
                parsed
                    .get("message")
                    .and_then(|v| v.as_str())
                    .context("log file needs a \"message\" field")?,
                parsed
                    .get("service")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                parsed
                    .get("level")
                    .and_then(|v| v.as_str())
                    .map(LogLevel::parse)
                    .unwrap_or(LogLevel::Unknown),
            );

            let verdict = app.pipeline.submit_log(record).await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(())
        }
        Some(Commands::Serve) | None => serve(app).await,
    }
}

/// Initialize tracing output
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("invalid log level")?;

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Construct adapters, stores and orchestrators
fn build_app(config: &Config) -> Result<AppState> {
    let redactor = Arc::new(HttpRedactor::new(&env_or(
        "LOGLENS_REDACTOR_URL",
        "http://localhost:9200",
    ))?);
    let embedder = Arc::new(HttpEmbeddingProvider::new(
        &env_or("LOGLENS_EMBEDDING_URL", "https://api.openai.com"),
        &env_or("LOGLENS_EMBEDDING_API_KEY", ""),
        &env_or("LOGLENS_EMBEDDING_MODEL", "text-embedding-3-small"),
    )?);
    let scorer_backend = Arc::new(HttpScoringBackend::new(&env_or(
        "LOGLENS_SCORER_URL",
        "http://localhost:9300",
    ))?);
    let clustering_backend = Arc::new(HttpClusteringBackend::new(&env_or(
        "LOGLENS_CLUSTERING_URL",
        "http://localhost:9400",
    ))?);
    let llm = Arc::new(HttpLlmClient::new(
        &env_or("LOGLENS_LLM_URL", "https://api.openai.com"),
        &env_or("LOGLENS_LLM_API_KEY", ""),
        &env_or("LOGLENS_LLM_MODEL", "gpt-4o-mini"),
    )?);

    let guard = BudgetGuard::new(config.budget.daily_budget_usd);

    let logs = Arc::new(InMemoryLogStore::new());
    let verdicts = Arc::new(InMemoryVerdictStore::new());
    let vectors = Arc::new(InMemoryVectorStore::new());
    let clusters = Arc::new(InMemoryClusterStore::new());

    let cache = Arc::new(EmbeddingCache::new(
        embedder,
        guard.clone(),
        config.cache.capacity,
    ));
    let validator = Arc::new(SemanticValidator::new(
        llm,
        guard.clone(),
        config.detection.validation_confidence_threshold,
    ));

    let pipeline = Arc::new(RealTimePipeline::new(
        redactor,
        cache,
        FastScorer::new(scorer_backend),
        validator.clone(),
        logs.clone(),
        verdicts.clone(),
        vectors.clone(),
        config.detection.clone(),
    ));

    let engine = Arc::new(BatchClusteringEngine::new(
        clustering_backend,
        vectors,
        clusters.clone(),
        verdicts.clone(),
        OutlierSweep::new(validator, logs.clone()),
        config.clustering.clone(),
    ));

    Ok(AppState {
        pipeline,
        engine,
        logs,
        verdicts,
        clusters,
        guard,
    })
}

/// Run the HTTP server until shutdown
async fn serve(state: AppState) -> Result<()> {
    let api_config = ApiConfig::from_env();
    let bind_addr = api_config.bind_addr.clone();
    let router = create_router(api_config, state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
