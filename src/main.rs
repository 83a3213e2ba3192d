//! QLP pipeline entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use qlp::domain::models::config::Config;
use qlp::domain::ports::clock::SystemClock;
use qlp::domain::ports::event_bus::EventBus;
use qlp::domain::ports::llm_client::LlmClient;
use qlp::infrastructure::bus::{MemoryBus, MemoryBusConfig};
use qlp::infrastructure::config::ConfigLoader;
use qlp::infrastructure::http;
use qlp::infrastructure::llm::{HttpLlmClient, HttpLlmConfig, MockLlmClient};
use qlp::infrastructure::logging::Logger;
use qlp::infrastructure::sandbox::NullSandbox;
use qlp::infrastructure::store::MemoryDagStore;
use qlp::services::packaging::PackagingEngine;
use qlp::services::retry::RetryPolicy;
use qlp::services::validation_engine::{ValidationEngine, ValidationEngineConfig};
use qlp::services::worker::{WorkerConfig, WorkerRuntime};
use qlp::services::{IntentScheduler, PatternEngine, PipelineMetrics};

#[derive(Parser)]
#[command(name = "qlp", about = "Intent execution pipeline", version)]
struct Cli {
    /// Configuration file override.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pipeline consumer plus the health/metrics surface.
    Serve {
        /// Use the scripted mock LLM instead of the HTTP transport.
        #[arg(long)]
        mock_llm: bool,
    },
    /// Load, validate and print the effective configuration.
    CheckConfig,
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig => {
            let mut config = load_config(&cli)?;
            config.llm.api_key = if config.llm.api_key.is_empty() {
                "(unset)".to_string()
            } else {
                "(redacted)".to_string()
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Serve { mock_llm } => {
            let config = load_config(&cli)?;
            let _logger =
                Logger::init(&config.logging).context("Failed to initialize logging")?;
            serve(config, mock_llm).await
        }
    }
}

async fn serve(config: Config, mock_llm: bool) -> Result<()> {
    info!(
        brokers = config.kafka_brokers.len(),
        port = config.port,
        validation = ?config.validation.level,
        "starting pipeline"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let clock = Arc::new(SystemClock);

    let bus = Arc::new(MemoryBus::new(MemoryBusConfig {
        partitions: config.bus.partitions,
        redelivery_delay: Duration::from_millis(config.bus.redelivery_delay_ms),
        shutdown_timeout: Duration::from_secs(config.timeouts.shutdown_secs),
        retry: RetryPolicy::from(&config.retry),
    }));

    let store = Arc::new(MemoryDagStore::new(Duration::from_secs(
        config.store.dag_ttl_secs,
    )));

    let llm: Arc<dyn LlmClient> = if mock_llm {
        warn!("running with the mock llm client");
        Arc::new(MockLlmClient::new())
    } else {
        Arc::new(
            HttpLlmClient::new(HttpLlmConfig::from_config(
                &config.llm,
                config.timeouts.llm_secs,
            ))
            .context("Failed to build llm client")?,
        )
    };

    // Consumers, registered in dependency order: scheduler, workers,
    // validators, packaging. Each owns a named consumer group.
    let scheduler = IntentScheduler::new(
        bus.clone(),
        store.clone(),
        metrics.clone(),
        config.providers.clone(),
    );
    scheduler
        .register()
        .await
        .context("Failed to register scheduler")?;

    let worker = WorkerRuntime::new(
        bus.clone(),
        llm.clone(),
        Arc::new(NullSandbox),
        metrics.clone(),
        WorkerConfig {
            llm_deadline: Duration::from_secs(config.timeouts.llm_secs),
            sandbox_deadline: Duration::from_secs(config.timeouts.sandbox_secs),
        },
    );
    worker.register().await.context("Failed to register worker")?;

    let validator = Arc::new(ValidationEngine::new(
        bus.clone(),
        llm,
        Arc::new(PatternEngine::new(config.validation.confidence_threshold)),
        metrics.clone(),
        ValidationEngineConfig {
            level: config.validation.level,
            max_refinement_cycles: config.validation.max_refinement_cycles,
            llm_deadline: Duration::from_secs(config.timeouts.llm_secs),
        },
    ));
    validator
        .register()
        .await
        .context("Failed to register validator")?;

    let packaging = PackagingEngine::new(
        bus.clone(),
        clock,
        metrics.clone(),
        config.output_dir.clone(),
    );
    packaging
        .register()
        .await
        .context("Failed to register packaging")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let http_handle = tokio::spawn(http::serve(config.port, metrics, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    // Consumers drain first (bounded by the bus shutdown budget), then the
    // HTTP surface goes down.
    bus.shutdown().await;
    let _ = shutdown_tx.send(true);
    match http_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http surface exited with error"),
        Err(e) => error!(error = %e, "http task join failed"),
    }

    info!("pipeline stopped");
    Ok(())
}
