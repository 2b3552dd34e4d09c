//! Check scheduler — one recurring check loop per assigned service.
//!
//! `monitor_service` replaces any existing loop for the same service,
//! so there is never more than one timer per service id. Concurrency
//! across simultaneously-firing loops is bounded by the worker's
//! configured limit, independent of how many services are assigned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use guardant_state::ServiceId;

use crate::pipeline::CheckPipeline;
use crate::probe::CheckSpec;

/// How long a stopping check loop may finish its in-flight probe.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Per-service loop state.
struct CheckSlot {
    /// Handle to the background check task.
    handle: JoinHandle<()>,
    /// Shutdown signal for this loop.
    shutdown_tx: watch::Sender<bool>,
}

/// Manages the recurring check loops for one worker.
pub struct CheckScheduler {
    pipeline: Arc<CheckPipeline>,
    /// Active loops: service_id → slot.
    slots: Arc<RwLock<HashMap<ServiceId, CheckSlot>>>,
    /// Bounds concurrent check execution across all loops.
    limiter: Arc<Semaphore>,
}

impl CheckScheduler {
    pub fn new(pipeline: Arc<CheckPipeline>, max_concurrency: u32) -> Self {
        Self {
            pipeline,
            slots: Arc::new(RwLock::new(HashMap::new())),
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1) as usize)),
        }
    }

    /// Start (or restart) the check loop for a service.
    ///
    /// The first check runs immediately; later ones every `interval`.
    pub async fn start(&self, spec: CheckSpec, interval: Duration) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let service_id = spec.service_id.clone();
        let pipeline = self.pipeline.clone();
        let limiter = self.limiter.clone();

        let handle = tokio::spawn(async move {
            run_check_loop(pipeline, spec, interval, limiter, shutdown_rx).await;
        });

        let mut slots = self.slots.write().await;
        if let Some(old) = slots.insert(
            service_id.clone(),
            CheckSlot {
                handle,
                shutdown_tx,
            },
        ) {
            // Stop the old loop if one was running.
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%service_id, interval_secs = interval.as_secs(), "check loop started");
    }

    /// Cancel the check loop for a service.
    pub async fn stop(&self, service_id: &str) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.remove(service_id) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%service_id, "check loop stopped");
        } else {
            debug!(%service_id, "stop requested for service with no check loop");
        }
    }

    /// Stop every loop, letting in-flight probes finish within a grace
    /// period. For graceful shutdown.
    pub async fn stop_all(&self) {
        let drained: Vec<(ServiceId, CheckSlot)> = {
            let mut slots = self.slots.write().await;
            slots.drain().collect()
        };
        for (service_id, slot) in drained {
            let _ = slot.shutdown_tx.send(true);
            let abort = slot.handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, slot.handle)
                .await
                .is_err()
            {
                warn!(%service_id, "check loop did not stop in time, aborting");
                abort.abort();
            }
        }
        info!("all check loops stopped");
    }

    /// Service IDs with an active check loop.
    pub async fn active_services(&self) -> Vec<ServiceId> {
        let slots = self.slots.read().await;
        slots.keys().cloned().collect()
    }

    pub async fn is_scheduled(&self, service_id: &str) -> bool {
        let slots = self.slots.read().await;
        slots.contains_key(service_id)
    }
}

/// The check loop for a single service.
///
/// Checks are strictly serialized: the next one never starts before the
/// prior one completed and `interval` elapsed.
async fn run_check_loop(
    pipeline: Arc<CheckPipeline>,
    spec: CheckSpec,
    interval: Duration,
    limiter: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(service_id = %spec.service_id, "check loop starting");

    loop {
        {
            let Ok(_permit) = limiter.acquire().await else {
                break;
            };
            pipeline.run_check(&spec, None).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                debug!(service_id = %spec.service_id, "check loop shutting down");
                break;
            }
        }
    }
}
