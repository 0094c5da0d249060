//! catalog-cms-sync - Mirrors e-commerce catalog entities into headless CMS platforms
//!
//! This is the main entry point for the catalog-cms-sync service.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use catalog_cms_sync::adapters;
use catalog_cms_sync::catalog::{CatalogSource, SqliteCatalog};
use catalog_cms_sync::config::Config;
use catalog_cms_sync::events::{ChangeListener, EventBus};
use catalog_cms_sync::models::EntityType;
use catalog_cms_sync::otel::{init_tracing, OtelProvider, SyncMetrics};
use catalog_cms_sync::processor::SyncProcessor;
use catalog_cms_sync::queue::{JobProcessor, QueueWorker, SyncQueues};
use catalog_cms_sync::reconciler::BulkReconciler;
use catalog_cms_sync::server::{AppState, Server};
use catalog_cms_sync::sync::ReconcileScheduler;

/// catalog-cms-sync - Mirrors e-commerce catalog entities into headless CMS platforms
#[derive(Parser, Debug)]
#[command(name = "catalog-cms-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CMS_SYNC_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting catalog-cms-sync"
    );

    let catalog: Arc<dyn CatalogSource> =
        Arc::new(SqliteCatalog::new(&config.catalog.path).await?);
    info!(path = %config.catalog.path, "Catalog opened");

    let adapters = adapters::from_config(
        &config.cms,
        &config.rate_limit,
        &config.catalog.default_language,
    )?;
    let metrics = Arc::new(SyncMetrics::new(&otel_provider.meter()));
    let processor = Arc::new(SyncProcessor::new(
        catalog.clone(),
        adapters,
        metrics.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks = Vec::new();

    // One queue and worker pool per entity kind
    let queues = Arc::new(SyncQueues::for_all_kinds(config.queue.capacity));
    for queue in queues.iter() {
        let worker = QueueWorker::new(
            queue.clone(),
            processor.clone() as Arc<dyn JobProcessor>,
            &config.queue,
            metrics.clone(),
        );
        tasks.push(tokio::spawn(worker.run(shutdown_tx.subscribe())));
    }

    let events = EventBus::default();
    let listener = ChangeListener::new(queues.clone());
    tasks.push(tokio::spawn(
        listener.run(events.subscribe(), shutdown_tx.subscribe()),
    ));

    let reconciler = Arc::new(BulkReconciler::new(
        catalog,
        processor.clone(),
        &config.reconciler,
    ));
    let scheduler = ReconcileScheduler::new(
        config.scheduler.clone(),
        reconciler,
        EntityType::ALL.to_vec(),
        shutdown_tx.subscribe(),
    );
    let reconcile = scheduler.handle();
    tasks.push(tokio::spawn(scheduler.run()));

    let state = AppState {
        processor,
        reconcile,
        queues: queues.clone(),
        events,
        admin_token: config.server.admin_token.as_deref().map(Into::into),
    };

    let server = Server::new(config.server.clone(), state);
    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    // Stop intake, then wait for in-flight jobs
    queues.close_all();
    let _ = shutdown_tx.send(());
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "Background task failed");
        }
    }

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("catalog-cms-sync shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
