//! Job dispatcher — turns routing decisions into queued work.
//!
//! One scheduling pass walks the active service list, routes each
//! service, and publishes `monitor_service` jobs for new or changed
//! assignments. Assignments that stand unchanged are left alone so a
//! pass never resets a healthy check loop's timer; workers re-acquire
//! their loops after a restart through shard restore, not through
//! re-publication. Services that disappear (or lose a region to a
//! routing change) get `stop_monitoring` jobs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use guardant_queue::{MemoryQueue, MonitoringJob};
use guardant_registry::{WorkerRegistry, WorkerRequirements};
use guardant_routing::RoutingEngine;
use guardant_state::{RegionId, ServiceDefinition, ServiceId, ServiceStore, WorkerId};
use guardant_worker::{CommandEnvelope, WorkerCommand};

use crate::error::DispatchResult;

/// Outcome counters for one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub services_seen: usize,
    pub services_unchanged: usize,
    pub services_skipped: usize,
    pub jobs_published: usize,
    pub jobs_deduplicated: usize,
    pub stops_published: usize,
}

/// What a service was last told to do, for change detection.
#[derive(Debug, Clone, PartialEq)]
struct Assignment {
    definition: ServiceDefinition,
    regions: Vec<RegionId>,
    priority: u8,
}

/// Periodic scheduler: routes services and publishes monitoring jobs.
pub struct JobDispatcher {
    routing: RoutingEngine,
    registry: WorkerRegistry,
    services: Arc<dyn ServiceStore>,
    queue: Arc<MemoryQueue>,
    assignments: Mutex<HashMap<ServiceId, Assignment>>,
}

impl JobDispatcher {
    pub fn new(
        routing: RoutingEngine,
        registry: WorkerRegistry,
        services: Arc<dyn ServiceStore>,
        queue: Arc<MemoryQueue>,
    ) -> Self {
        Self {
            routing,
            registry,
            services,
            queue,
            assignments: Mutex::new(HashMap::new()),
        }
    }

    /// Run one scheduling pass over the active service list.
    ///
    /// A routing or config failure skips that service and keeps its
    /// previous assignment; it never aborts the pass.
    pub async fn run_pass(&self, now_ms: u64) -> PassSummary {
        let mut summary = PassSummary::default();

        let services = match self.services.active_services().await {
            Ok(services) => services,
            Err(e) => {
                warn!(error = %e, "service directory unavailable, skipping pass");
                return summary;
            }
        };

        let mut seen: HashSet<ServiceId> = HashSet::with_capacity(services.len());
        for service in services {
            summary.services_seen += 1;
            seen.insert(service.id.clone());

            if service.interval == 0 {
                warn!(service_id = %service.id, "service has zero interval, skipping");
                summary.services_skipped += 1;
                continue;
            }

            let regions = match self.routing.select_regions(&service, now_ms) {
                Ok(regions) => regions,
                Err(e) => {
                    warn!(service_id = %service.id, error = %e, "routing failed, skipping service");
                    summary.services_skipped += 1;
                    continue;
                }
            };

            let previous = self.assignments.lock().unwrap().get(&service.id).cloned();
            if let Some(prev) = &previous
                && prev.definition == service
                && prev.regions == regions
            {
                summary.services_unchanged += 1;
                continue;
            }

            let priority = self
                .services
                .subscription_tier(&service.nest_id)
                .await
                .job_priority();

            for region in &regions {
                if self.publish_monitor(&service, region, priority, now_ms) {
                    summary.jobs_published += 1;
                } else {
                    summary.jobs_deduplicated += 1;
                }
            }
            if let Some(prev) = previous {
                for region in prev.regions.iter().filter(|r| !regions.contains(r)) {
                    if self.publish_stop(&service.id, region, priority, now_ms) {
                        summary.stops_published += 1;
                    }
                }
            }

            self.assignments.lock().unwrap().insert(
                service.id.clone(),
                Assignment { definition: service, regions, priority },
            );
        }

        // Services gone from the directory stop checking everywhere
        // they were assigned.
        let retired: Vec<(ServiceId, Assignment)> = {
            let mut assignments = self.assignments.lock().unwrap();
            let ids: Vec<ServiceId> = assignments
                .keys()
                .filter(|id| !seen.contains(*id))
                .cloned()
                .collect();
            ids.into_iter()
                .filter_map(|id| assignments.remove(&id).map(|a| (id, a)))
                .collect()
        };
        for (service_id, assignment) in retired {
            info!(service_id = %service_id, "service retired, stopping checks");
            for region in &assignment.regions {
                if self.publish_stop(&service_id, region, assignment.priority, now_ms) {
                    summary.stops_published += 1;
                }
            }
        }

        summary
    }

    /// Publish one ad hoc check of a service, tagged with `cache_key`.
    ///
    /// Routes with the service's own policy; returns the regions the
    /// check was queued in.
    pub async fn dispatch_check_once(
        &self,
        service: &ServiceDefinition,
        cache_key: &str,
        now_ms: u64,
    ) -> DispatchResult<Vec<RegionId>> {
        let regions = self.routing.select_regions(service, now_ms)?;
        let priority = self
            .services
            .subscription_tier(&service.nest_id)
            .await
            .job_priority();

        for region in &regions {
            let payload = CommandEnvelope::new(WorkerCommand::CheckServiceOnce {
                service_id: service.id.clone(),
                nest_id: service.nest_id.clone(),
                service_type: service.service_type,
                target: service.target.clone(),
                config: service.config.clone(),
                regions: vec![region.clone()],
                cache_key: cache_key.to_string(),
            })
            .to_payload()?;

            let job = MonitoringJob {
                key: format!("once-{}-{}-{}", service.id, region, cache_key),
                priority,
                region: region.clone(),
                worker_hint: self.resolve_worker(service, region, now_ms),
                payload,
                created_at: now_ms,
            };
            if self.queue.publish(job, now_ms) {
                debug!(service_id = %service.id, region = %region, cache_key, "ad hoc check queued");
            }
        }
        Ok(regions)
    }

    /// Run scheduling passes until shutdown, one per tick.
    pub async fn run(&self, tick: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = tick.as_secs(), "job dispatcher started");
        self.log_pass(self.run_pass(epoch_ms()).await);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    self.log_pass(self.run_pass(epoch_ms()).await);
                }
                _ = shutdown.changed() => {
                    info!("job dispatcher stopped");
                    break;
                }
            }
        }
    }

    fn log_pass(&self, summary: PassSummary) {
        debug!(
            services = summary.services_seen,
            unchanged = summary.services_unchanged,
            skipped = summary.services_skipped,
            published = summary.jobs_published,
            deduplicated = summary.jobs_deduplicated,
            stops = summary.stops_published,
            "scheduling pass complete"
        );
    }

    fn publish_monitor(
        &self,
        service: &ServiceDefinition,
        region: &str,
        priority: u8,
        now_ms: u64,
    ) -> bool {
        let payload = match CommandEnvelope::new(WorkerCommand::MonitorService {
            service_id: service.id.clone(),
            nest_id: service.nest_id.clone(),
            service_type: service.service_type,
            target: service.target.clone(),
            config: service.config.clone(),
            regions: vec![region.to_string()],
            interval: service.interval,
        })
        .to_payload()
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(service_id = %service.id, error = %e, "command encoding failed");
                return false;
            }
        };

        let job = MonitoringJob {
            key: service.job_key(region),
            priority,
            region: region.to_string(),
            worker_hint: self.resolve_worker(service, region, now_ms),
            payload,
            created_at: now_ms,
        };
        let published = self.queue.publish(job, now_ms);
        if published {
            debug!(
                service_id = %service.id,
                region,
                priority,
                "monitor job published"
            );
        }
        published
    }

    fn publish_stop(&self, service_id: &str, region: &str, priority: u8, now_ms: u64) -> bool {
        let payload = match CommandEnvelope::new(WorkerCommand::StopMonitoring {
            service_id: service_id.to_string(),
        })
        .to_payload()
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(service_id, error = %e, "command encoding failed");
                return false;
            }
        };

        let job = MonitoringJob {
            key: format!("stop-{service_id}-{region}"),
            priority,
            region: region.to_string(),
            worker_hint: None,
            payload,
            created_at: now_ms,
        };
        self.queue.publish(job, now_ms)
    }

    /// Best live worker for a (service, region) pair, as a routing hint.
    fn resolve_worker(
        &self,
        service: &ServiceDefinition,
        region: &str,
        now_ms: u64,
    ) -> Option<WorkerId> {
        let req = WorkerRequirements {
            service_type: service.service_type,
            region: Some(region.to_string()),
            target_location: self.routing.locate_target(service),
            tags: Vec::new(),
        };
        match self.registry.find_best_worker(&req, now_ms) {
            Ok(Some(worker)) => Some(worker.id),
            Ok(None) => {
                debug!(service_id = %service.id, region, "no live worker for placement hint");
                None
            }
            Err(e) => {
                warn!(service_id = %service.id, error = %e, "worker lookup failed");
                None
            }
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
