//! Worker registry — tracks the fleet of monitoring workers.
//!
//! Workers register under a TTL lease and keep it alive with periodic
//! heartbeats. Liveness is stricter than the lease: a worker whose last
//! heartbeat is older than the liveness window is invisible to routing
//! even while its lease lingers. Crashed workers therefore stop
//! receiving checks within the window and are purged once the lease
//! lapses.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use guardant_state::*;

use crate::score::{WorkerRequirements, rank_workers};

/// Registration lease: how long a record outlives its last heartbeat.
pub const WORKER_TTL_MS: u64 = 300_000;

/// A worker is live iff `now - last_heartbeat < LIVENESS_WINDOW_MS`.
pub const LIVENESS_WINDOW_MS: u64 = 120_000;

/// How often workers are expected to heartbeat.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Manages worker registration, liveness, and placement lookups.
///
/// Persists worker records to the `StateStore`; every read takes an
/// explicit `now_ms` so liveness stays a pure function of time.
#[derive(Clone)]
pub struct WorkerRegistry {
    state: StateStore,
    ttl: Duration,
    liveness_window: Duration,
}

impl WorkerRegistry {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            ttl: Duration::from_millis(WORKER_TTL_MS),
            liveness_window: Duration::from_millis(LIVENESS_WINDOW_MS),
        }
    }

    /// Set the registration lease duration.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the liveness window.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Register (or re-register) a worker.
    ///
    /// Registration counts as a heartbeat: the stored record's
    /// `last_heartbeat` is set to `now_ms` and a fresh lease begins.
    pub fn register(&self, node: &WorkerNode, now_ms: u64) -> StateResult<()> {
        let mut node = node.clone();
        node.status.last_heartbeat = now_ms;
        self.state
            .put_worker(&node, now_ms + self.ttl.as_millis() as u64)?;
        info!(worker_id = %node.id, region = %node.region, "worker registered");
        Ok(())
    }

    /// Process a worker heartbeat: refresh the lease and load counters.
    ///
    /// Returns false when the worker is unknown or its lease lapsed;
    /// such workers must re-register.
    pub fn heartbeat(&self, worker_id: &str, load: &WorkerLoad, now_ms: u64) -> StateResult<bool> {
        let refreshed = self.state.heartbeat_worker(
            worker_id,
            load,
            now_ms,
            now_ms + self.ttl.as_millis() as u64,
        )?;
        if refreshed {
            debug!(worker_id, active_checks = load.active_checks, "heartbeat received");
        } else {
            warn!(worker_id, "heartbeat from unregistered worker");
        }
        Ok(refreshed)
    }

    /// Remove a worker's record immediately (graceful shutdown).
    pub fn deregister(&self, worker_id: &str) -> StateResult<bool> {
        let existed = self.state.delete_worker(worker_id)?;
        if existed {
            info!(worker_id, "worker deregistered");
        }
        Ok(existed)
    }

    /// Get a worker by id, live or not (lease permitting).
    pub fn get(&self, worker_id: &str, now_ms: u64) -> StateResult<Option<WorkerNode>> {
        self.state.get_worker(worker_id, now_ms)
    }

    /// Whether a worker heartbeated within the liveness window.
    pub fn is_live(&self, node: &WorkerNode, now_ms: u64) -> bool {
        now_ms.saturating_sub(node.status.last_heartbeat) < self.liveness_window.as_millis() as u64
    }

    /// All workers currently eligible for routing.
    pub fn live_workers(&self, now_ms: u64) -> StateResult<Vec<WorkerNode>> {
        let workers = self.state.list_workers(now_ms)?;
        Ok(workers.into_iter().filter(|w| self.is_live(w, now_ms)).collect())
    }

    /// Live workers deployed in one region.
    pub fn live_workers_in_region(
        &self,
        region: &str,
        now_ms: u64,
    ) -> StateResult<Vec<WorkerNode>> {
        let workers = self.live_workers(now_ms)?;
        Ok(workers.into_iter().filter(|w| w.region == region).collect())
    }

    /// Region ids with at least one live worker.
    pub fn available_regions(&self, now_ms: u64) -> StateResult<HashSet<RegionId>> {
        let workers = self.live_workers(now_ms)?;
        Ok(workers.into_iter().map(|w| w.region).collect())
    }

    /// Whether any live worker serves the region.
    pub fn region_available(&self, region: &str, now_ms: u64) -> StateResult<bool> {
        Ok(!self.live_workers_in_region(region, now_ms)?.is_empty())
    }

    /// Pick the best live worker for the given requirements.
    ///
    /// Candidates are scored on proximity, capacity, reliability, and
    /// tags; score ties go to the least-loaded worker. Returns None when
    /// no live worker can serve the requirements.
    pub fn find_best_worker(
        &self,
        req: &WorkerRequirements,
        now_ms: u64,
    ) -> StateResult<Option<WorkerNode>> {
        let candidates = self.live_workers(now_ms)?;
        let ranked = rank_workers(&candidates, req);
        let Some(best) = ranked.first() else {
            return Ok(None);
        };
        debug!(
            worker_id = %best.worker_id,
            score = best.score,
            "placement candidate selected"
        );
        Ok(candidates.into_iter().find(|w| w.id == best.worker_id))
    }

    /// Remove worker records whose lease lapsed. Returns number removed.
    pub fn purge_expired(&self, now_ms: u64) -> StateResult<u32> {
        let purged = self.state.purge_expired_workers(now_ms)?;
        if purged > 0 {
            warn!(purged, "purged expired worker records");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> WorkerRegistry {
        WorkerRegistry::new(StateStore::open_in_memory().unwrap())
    }

    fn make_worker(id: &str, region: &str) -> WorkerNode {
        WorkerNode {
            id: id.to_string(),
            name: id.to_string(),
            version: "0.1.0".to_string(),
            region: region.to_string(),
            location: GeoLocation {
                continent: "Europe".to_string(),
                country: "IE".to_string(),
                city: "Dublin".to_string(),
                coordinates: Coordinates { lat: 53.3498, lon: -6.2603 },
            },
            capabilities: WorkerCapabilities {
                service_types: vec![ServiceType::Web, ServiceType::Tcp],
                limits: WorkerLimits { max_concurrency: 10 },
            },
            network: NetworkInfo::default(),
            status: WorkerStatus {
                started_at: 0,
                last_heartbeat: 0,
                checks_completed: 0,
                checks_failed: 0,
                active_checks: 0,
            },
            tags: Vec::new(),
        }
    }

    #[test]
    fn register_makes_worker_live() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        let live = registry.live_workers(1_000).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "w1");
    }

    #[test]
    fn liveness_window_boundary() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        // Live strictly inside the window, not at its edge.
        let node = registry.get("w1", 1_000).unwrap().unwrap();
        assert!(registry.is_live(&node, 1_000 + LIVENESS_WINDOW_MS - 1));
        assert!(!registry.is_live(&node, 1_000 + LIVENESS_WINDOW_MS));

        assert_eq!(registry.live_workers(1_000 + LIVENESS_WINDOW_MS).unwrap().len(), 0);
    }

    #[test]
    fn heartbeat_restores_liveness() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        let stale_at = 1_000 + LIVENESS_WINDOW_MS;
        assert!(registry.live_workers(stale_at).unwrap().is_empty());

        // Lease (5 min) outlives the liveness window (2 min), so the
        // heartbeat still lands and revives the worker.
        let ack = registry
            .heartbeat("w1", &WorkerLoad::default(), stale_at)
            .unwrap();
        assert!(ack);
        assert_eq!(registry.live_workers(stale_at).unwrap().len(), 1);
    }

    #[test]
    fn heartbeat_after_lease_lapse_requires_reregistration() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        let after_lease = 1_000 + WORKER_TTL_MS;
        let ack = registry
            .heartbeat("w1", &WorkerLoad::default(), after_lease)
            .unwrap();
        assert!(!ack);

        registry.register(&make_worker("w1", "eu-west-1"), after_lease).unwrap();
        assert_eq!(registry.live_workers(after_lease).unwrap().len(), 1);
    }

    #[test]
    fn available_regions_reflect_live_workers() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();
        registry.register(&make_worker("w2", "us-east-1"), 1_000).unwrap();
        // Stale worker in ap-southeast-1.
        registry.register(&make_worker("w3", "ap-southeast-1"), 1_000).unwrap();
        let later = 1_000 + LIVENESS_WINDOW_MS - 1;
        registry.heartbeat("w1", &WorkerLoad::default(), later).unwrap();
        registry.heartbeat("w2", &WorkerLoad::default(), later).unwrap();

        let probe_at = later + LIVENESS_WINDOW_MS - 1;
        let regions = registry.available_regions(probe_at).unwrap();
        assert!(regions.contains("eu-west-1"));
        assert!(regions.contains("us-east-1"));
        assert!(!regions.contains("ap-southeast-1"));
        assert!(registry.region_available("eu-west-1", probe_at).unwrap());
        assert!(!registry.region_available("ap-southeast-1", probe_at).unwrap());
    }

    #[test]
    fn find_best_worker_scopes_by_region() {
        let registry = test_registry();
        registry.register(&make_worker("w-eu", "eu-west-1"), 1_000).unwrap();
        registry.register(&make_worker("w-us", "us-east-1"), 1_000).unwrap();

        let req = WorkerRequirements {
            service_type: ServiceType::Web,
            region: Some("us-east-1".to_string()),
            target_location: None,
            tags: Vec::new(),
        };
        let best = registry.find_best_worker(&req, 1_000).unwrap().unwrap();
        assert_eq!(best.id, "w-us");
    }

    #[test]
    fn find_best_worker_prefers_idle_on_tie() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();
        registry.register(&make_worker("w2", "eu-west-1"), 1_000).unwrap();
        registry
            .heartbeat(
                "w1",
                &WorkerLoad { active_checks: 9, checks_completed: 0, checks_failed: 0 },
                2_000,
            )
            .unwrap();
        registry
            .heartbeat(
                "w2",
                &WorkerLoad { active_checks: 1, checks_completed: 0, checks_failed: 0 },
                2_000,
            )
            .unwrap();

        let req = WorkerRequirements {
            service_type: ServiceType::Web,
            region: Some("eu-west-1".to_string()),
            target_location: None,
            tags: Vec::new(),
        };
        let best = registry.find_best_worker(&req, 2_000).unwrap().unwrap();
        assert_eq!(best.id, "w2");
    }

    #[test]
    fn find_best_worker_none_when_no_capability() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        let req = WorkerRequirements {
            service_type: ServiceType::Dns,
            region: None,
            target_location: None,
            tags: Vec::new(),
        };
        assert!(registry.find_best_worker(&req, 1_000).unwrap().is_none());
    }

    #[test]
    fn purge_reclaims_lapsed_leases() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        assert_eq!(registry.purge_expired(1_000 + WORKER_TTL_MS - 1).unwrap(), 0);
        assert_eq!(registry.purge_expired(1_000 + WORKER_TTL_MS).unwrap(), 1);
        assert!(registry.get("w1", 1_000).unwrap().is_none());
    }

    #[test]
    fn deregister_removes_immediately() {
        let registry = test_registry();
        registry.register(&make_worker("w1", "eu-west-1"), 1_000).unwrap();

        assert!(registry.deregister("w1").unwrap());
        assert!(!registry.deregister("w1").unwrap());
        assert!(registry.live_workers(1_000).unwrap().is_empty());
    }
}
