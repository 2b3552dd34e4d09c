//! Worker runtime — the queue consumption and heartbeat loops.
//!
//! One runtime per worker process: it registers the worker, consumes
//! commands from the shared queue (one unacknowledged delivery at a
//! time), drives the check scheduler, and keeps the registry lease
//! alive. Malformed or invalid commands are rejected without requeue.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{error, info, warn};

use guardant_queue::{Delivery, MemoryQueue};
use guardant_registry::{WorkerRegistry, HEARTBEAT_INTERVAL_MS};
use guardant_state::{ServiceDefinition, StateResult, WorkerNode};

use crate::command::{CommandEnvelope, WorkerCommand};
use crate::pipeline::{CheckPipeline, CheckStats};
use crate::probe::CheckSpec;
use crate::restore::assigned_to;
use crate::scheduler::CheckScheduler;

pub struct WorkerRuntime {
    node: WorkerNode,
    registry: WorkerRegistry,
    queue: Arc<MemoryQueue>,
    scheduler: Arc<CheckScheduler>,
    pipeline: Arc<CheckPipeline>,
    stats: Arc<CheckStats>,
    replica_count: u32,
    replica_index: u32,
}

impl WorkerRuntime {
    pub fn new(
        node: WorkerNode,
        registry: WorkerRegistry,
        queue: Arc<MemoryQueue>,
        pipeline: Arc<CheckPipeline>,
    ) -> Self {
        let scheduler = Arc::new(CheckScheduler::new(
            pipeline.clone(),
            node.capabilities.limits.max_concurrency,
        ));
        let stats = pipeline.stats();
        Self {
            node,
            registry,
            queue,
            scheduler,
            pipeline,
            stats,
            replica_count: 1,
            replica_index: 0,
        }
    }

    /// Place this worker in a replica group for startup restore.
    pub fn with_replicas(mut self, replica_count: u32, replica_index: u32) -> Self {
        self.replica_count = replica_count.max(1);
        self.replica_index = replica_index;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.node.id
    }

    pub fn scheduler(&self) -> Arc<CheckScheduler> {
        self.scheduler.clone()
    }

    /// Resume monitoring for this replica's shard of the service list.
    ///
    /// Lets a fleet pick its assignments back up after a restart even
    /// while the coordinator is down. Returns how many loops started.
    pub async fn restore_assignments(&self, services: &[ServiceDefinition]) -> usize {
        let mut restored = 0;
        for service in services {
            if !service.enabled {
                continue;
            }
            if !assigned_to(&service.id, self.replica_count, self.replica_index) {
                continue;
            }
            let spec = CheckSpec {
                service_id: service.id.clone(),
                nest_id: service.nest_id.clone(),
                service_type: service.service_type,
                target: service.target.clone(),
                config: service.config.clone(),
            };
            self.scheduler
                .start(spec, Duration::from_secs(service.interval))
                .await;
            restored += 1;
        }
        info!(
            restored,
            replica = self.replica_index,
            replicas = self.replica_count,
            "restored monitoring assignments"
        );
        restored
    }

    /// Run until shutdown: register, consume commands, heartbeat.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.register_now() {
            error!(error = %e, worker_id = %self.node.id, "initial registration failed");
        }
        info!(
            worker_id = %self.node.id,
            region = %self.node.region,
            "worker runtime started"
        );

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));

        loop {
            tokio::select! {
                delivery = self.queue.consume(&self.node.id) => {
                    match delivery {
                        Ok(delivery) => self.handle_delivery(delivery).await,
                        Err(e) => {
                            warn!(error = %e, worker_id = %self.node.id, "queue consume failed");
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat();
                }
                _ = shutdown.changed() => {
                    info!(worker_id = %self.node.id, "worker runtime shutting down");
                    self.scheduler.stop_all().await;
                    break;
                }
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        match CommandEnvelope::from_payload(&delivery.job.payload) {
            Ok(envelope) => {
                self.execute(envelope.command).await;
                if let Err(e) = self.queue.ack(&delivery.receipt, epoch_ms()) {
                    warn!(error = %e, key = %delivery.job.key, "ack failed");
                }
            }
            Err(e) => {
                // Poison: reject without requeue so it cannot loop.
                warn!(
                    error = %e,
                    key = %delivery.job.key,
                    attempt = delivery.attempt,
                    "rejecting unprocessable command"
                );
                if let Err(e) = self.queue.nack(&delivery.receipt, false, epoch_ms()) {
                    warn!(error = %e, key = %delivery.job.key, "nack failed");
                }
            }
        }
    }

    async fn execute(&self, command: WorkerCommand) {
        match command {
            WorkerCommand::MonitorService {
                service_id,
                nest_id,
                service_type,
                target,
                config,
                regions: _,
                interval,
            } => {
                let spec = CheckSpec {
                    service_id,
                    nest_id,
                    service_type,
                    target,
                    config,
                };
                self.scheduler
                    .start(spec, Duration::from_secs(interval))
                    .await;
            }
            WorkerCommand::StopMonitoring { service_id } => {
                self.scheduler.stop(&service_id).await;
            }
            WorkerCommand::CheckServiceOnce {
                service_id,
                nest_id,
                service_type,
                target,
                config,
                regions: _,
                cache_key,
            } => {
                let spec = CheckSpec {
                    service_id,
                    nest_id,
                    service_type,
                    target,
                    config,
                };
                self.pipeline.run_check(&spec, Some(cache_key)).await;
            }
        }
    }

    fn send_heartbeat(&self) {
        let load = self.stats.load();
        match self.registry.heartbeat(&self.node.id, &load, epoch_ms()) {
            Ok(true) => {}
            Ok(false) => {
                warn!(worker_id = %self.node.id, "registry lease lapsed, re-registering");
                if let Err(e) = self.register_now() {
                    error!(error = %e, worker_id = %self.node.id, "re-registration failed");
                }
            }
            Err(e) => warn!(error = %e, worker_id = %self.node.id, "heartbeat failed"),
        }
    }

    fn register_now(&self) -> StateResult<()> {
        self.registry.register(&self.node, epoch_ms())
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
