//! guardantd — the GuardAnt monitoring daemon.
//!
//! Single binary that assembles all GuardAnt subsystems:
//! - State store (redb)
//! - Worker registry + region catalog
//! - In-memory job queue
//! - Dispatcher (routing decisions to queued commands)
//! - Embedded check workers with result outboxes
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! guardantd --config guardant.toml standalone --port 8070
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use guardant_api::ApiState;
use guardant_dispatch::JobDispatcher;
use guardant_incident::{IncidentManager, LogNotifier};
use guardant_metrics::CheckMetrics;
use guardant_outbox::{LogSink, OutboxConfig, ResultOutbox};
use guardant_queue::MemoryQueue;
use guardant_registry::{RegionCatalog, WorkerRegistry};
use guardant_routing::RoutingEngine;
use guardant_state::{
    GeoLocation, NetworkInfo, ServiceStore, ServiceType, StateStore, StaticServiceStore,
    WorkerCapabilities, WorkerLimits, WorkerNode, WorkerStatus,
};
use guardant_worker::{CheckPipeline, ProbeExecutor, StubExecutor, WorkerRuntime};

use config::GuardantConfig;

#[derive(Parser)]
#[command(name = "guardantd", about = "GuardAnt monitoring daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "guardant.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (coordinator and workers in one process).
    Standalone {
        /// Port to listen on. Overrides the config file.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state. Overrides the config file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,guardantd=debug,guardant=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        GuardantConfig::from_file(&cli.config)?
    } else {
        info!(path = ?cli.config, "no config file found, using defaults");
        GuardantConfig::default()
    };

    match cli.command {
        Command::Standalone { port, data_dir } => {
            if let Some(port) = port {
                config.coordinator.api_port = port;
            }
            if let Some(data_dir) = data_dir {
                config.coordinator.data_dir = data_dir;
            }
            run_standalone(config).await
        }
    }
}

async fn run_standalone(config: GuardantConfig) -> anyhow::Result<()> {
    info!("GuardAnt daemon starting in standalone mode");

    // Ensure data directory exists.
    let data_dir = config.coordinator.data_dir.clone();
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("guardant.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Worker registry + region catalog.
    let registry = WorkerRegistry::new(state.clone());
    let catalog = RegionCatalog::default_pops();
    info!(regions = catalog.regions().len(), "region catalog loaded");

    // Job queue.
    let queue = Arc::new(MemoryQueue::new());

    // Service directory, seeded from the config file.
    let services = Arc::new(StaticServiceStore::new());
    for entry in &config.services {
        services.upsert(entry.to_definition()).await;
    }
    for (nest_id, tier) in &config.tiers {
        services.set_tier(nest_id.clone(), *tier).await;
    }
    info!(services = config.services.len(), "service directory loaded");

    // Metrics + incidents.
    let metrics = Arc::new(CheckMetrics::new());
    let incidents = Arc::new(IncidentManager::new(state.clone(), Arc::new(LogNotifier)));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start embedded workers ─────────────────────────────────

    let pop = catalog
        .get(&config.worker.region)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("unknown worker region: {}", config.worker.region))?;

    // No real probe implementations are wired in yet.
    let executor: Arc<dyn ProbeExecutor> = Arc::new(StubExecutor::always_up());
    warn!("probe executors not configured, every check will report up");

    let definitions: Vec<_> = config.services.iter().map(|s| s.to_definition()).collect();
    let replicas = config.worker.replicas.max(1);
    let mut worker_handles = Vec::new();
    let mut outbox_handles = Vec::new();
    let mut outboxes = Vec::new();

    for index in 0..replicas {
        let node_id = format!("ant-{}-{}", config.worker.region, index);
        let node = WorkerNode {
            id: node_id.clone(),
            name: node_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            region: config.worker.region.clone(),
            location: GeoLocation {
                continent: pop.continent.clone(),
                country: pop.country.clone(),
                city: pop.city.clone(),
                coordinates: pop.coordinates,
            },
            capabilities: WorkerCapabilities {
                service_types: vec![
                    ServiceType::Web,
                    ServiceType::Tcp,
                    ServiceType::Ping,
                    ServiceType::Dns,
                ],
                limits: WorkerLimits {
                    max_concurrency: config.worker.max_concurrency,
                },
            },
            network: NetworkInfo::default(),
            status: WorkerStatus {
                started_at: epoch_ms(),
                last_heartbeat: 0,
                checks_completed: 0,
                checks_failed: 0,
                active_checks: 0,
            },
            tags: vec![],
        };

        let outbox = Arc::new(ResultOutbox::new(
            OutboxConfig {
                max_cache_size: config.outbox.max_cache_size,
                flush_interval: Duration::from_secs(config.outbox.flush_interval_secs),
                path: Some(data_dir.join(format!("outbox-{node_id}.json"))),
                ..OutboxConfig::default()
            },
            Arc::new(LogSink),
        ));
        let pipeline = Arc::new(CheckPipeline::new(
            node_id.clone(),
            config.worker.region.clone(),
            executor.clone(),
            state.clone(),
            outbox.clone(),
            metrics.clone(),
            incidents.clone(),
        ));
        let runtime = Arc::new(
            WorkerRuntime::new(node, registry.clone(), queue.clone(), pipeline)
                .with_replicas(replicas, index),
        );

        if config.worker.restore_on_start {
            let restored = runtime.restore_assignments(&definitions).await;
            info!(worker = %node_id, restored, "check loops restored from config");
        }

        let worker_shutdown = shutdown_rx.clone();
        let worker = runtime.clone();
        worker_handles.push(tokio::spawn(async move {
            worker.run(worker_shutdown).await;
        }));

        let outbox_shutdown = shutdown_rx.clone();
        let outbox_task = outbox.clone();
        outbox_handles.push(tokio::spawn(async move {
            outbox_task.run(outbox_shutdown).await;
        }));
        outboxes.push(outbox);
    }
    info!(replicas, region = %config.worker.region, "embedded workers started");

    // ── Start dispatcher ───────────────────────────────────────

    let dispatcher = JobDispatcher::new(
        RoutingEngine::new(catalog.clone(), registry.clone()),
        registry.clone(),
        services.clone() as Arc<dyn ServiceStore>,
        queue.clone(),
    );
    let tick = Duration::from_secs(config.coordinator.tick_secs);
    let dispatcher_shutdown = shutdown_rx.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(tick, dispatcher_shutdown).await;
    });

    // ── Start expiry sweep ─────────────────────────────────────

    let purge_registry = registry.clone();
    let purge_state = state.clone();
    let mut purge_shutdown = shutdown_rx.clone();
    let purge_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    let now = epoch_ms();
                    match purge_registry.purge_expired(now) {
                        Ok(0) => {}
                        Ok(purged) => debug!(purged, "expired workers removed"),
                        Err(e) => warn!(error = %e, "worker purge failed"),
                    }
                    match purge_state.purge_expired_status(now) {
                        Ok(0) => {}
                        Ok(purged) => debug!(purged, "expired status entries removed"),
                        Err(e) => warn!(error = %e, "status purge failed"),
                    }
                }
                _ = purge_shutdown.changed() => break,
            }
        }
    });

    // ── Start API server ───────────────────────────────────────

    let router = guardant_api::build_router(ApiState {
        store: state,
        registry,
        catalog,
        queue,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.coordinator.api_port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks. Workers first, so checks still in
    // flight drain before the outboxes are persisted for the last time.
    let _ = dispatcher_handle.await;
    let _ = purge_handle.await;
    for handle in worker_handles {
        let _ = handle.await;
    }
    for handle in outbox_handles {
        let _ = handle.await;
    }
    for outbox in &outboxes {
        if let Err(e) = outbox.persist().await {
            warn!(error = %e, "final outbox persist failed");
        }
    }

    info!("GuardAnt daemon stopped");
    Ok(())
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
