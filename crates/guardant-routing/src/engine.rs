//! Routing engine — decides which regions check a service each pass.
//!
//! Selection walks three stages: intersect the service's preferred
//! regions with live-worker availability, apply the policy's strategy,
//! then clamp the result into the policy's min/max bounds (backfilling
//! deterministically from the general available pool). Everything takes
//! an explicit `now_ms`, so a selection is a pure function of registry
//! state and the engine's round-robin memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use guardant_registry::{RegionCatalog, WorkerRegistry};
use guardant_state::{
    Coordinates, MonitoringPolicy, RegionId, RoutingStrategy, ServiceDefinition, ServiceId,
};

use crate::error::{RoutingError, RoutingResult};
use crate::geo::{GeoLocator, NullLocator};

/// Region selection for monitored services.
pub struct RoutingEngine {
    catalog: RegionCatalog,
    registry: WorkerRegistry,
    locator: Arc<dyn GeoLocator>,
    /// Last region handed out per service; drives round-robin rotation.
    last_selected: Mutex<HashMap<ServiceId, RegionId>>,
}

impl RoutingEngine {
    pub fn new(catalog: RegionCatalog, registry: WorkerRegistry) -> Self {
        Self {
            catalog,
            registry,
            locator: Arc::new(NullLocator),
            last_selected: Mutex::new(HashMap::new()),
        }
    }

    /// Set the geo estimation source.
    pub fn with_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Best-effort location of a service's target.
    pub fn locate_target(&self, service: &ServiceDefinition) -> Option<Coordinates> {
        self.locator.locate(&service.target)
    }

    /// Select the regions that should check `service` this pass.
    ///
    /// Errors with [`RoutingError::NoAvailableRegion`] only when the
    /// final selection would be empty; partial availability degrades to
    /// whatever is live.
    pub fn select_regions(
        &self,
        service: &ServiceDefinition,
        now_ms: u64,
    ) -> RoutingResult<Vec<RegionId>> {
        let policy = &service.monitoring;

        // Preferred set: the policy's regions, or the whole catalog when
        // the tenant named none. Unknown ids are skipped, not fatal.
        let preferred: Vec<RegionId> = if policy.regions.is_empty() {
            self.catalog.regions().iter().map(|r| r.id.clone()).collect()
        } else {
            policy
                .regions
                .iter()
                .filter(|id| {
                    let known = self.catalog.contains(id);
                    if !known {
                        warn!(service_id = %service.id, region = %id, "unknown region in monitoring policy");
                    }
                    known
                })
                .cloned()
                .collect()
        };

        let live = self.registry.available_regions(now_ms)?;
        let available: Vec<RegionId> =
            preferred.into_iter().filter(|id| live.contains(id)).collect();

        let selected = match policy.strategy {
            RoutingStrategy::AllSelected => available,
            RoutingStrategy::Closest => {
                self.closest(service, &available).into_iter().collect()
            }
            RoutingStrategy::RoundRobin => {
                self.round_robin(&service.id, &available).into_iter().collect()
            }
            RoutingStrategy::Failover => self.failover(service, &available),
        };

        let backfill_pool = self.catalog.available_ids(&self.registry, now_ms)?;
        self.clamp(service, selected, policy, &backfill_pool)
    }

    /// The candidate region nearest the service's target.
    ///
    /// Without a location estimate the strategy degrades to the first
    /// available preferred region.
    fn closest(&self, service: &ServiceDefinition, available: &[RegionId]) -> Option<RegionId> {
        if available.is_empty() {
            return None;
        }
        match self.locator.locate(&service.target) {
            Some(target) => available
                .iter()
                .min_by(|a, b| {
                    let da = self.region_distance_km(a, &target);
                    let db = self.region_distance_km(b, &target);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned(),
            None => {
                debug!(
                    service_id = %service.id,
                    target = %service.target,
                    "no location estimate for target, using first available region"
                );
                available.first().cloned()
            }
        }
    }

    /// Rotate through available regions, one per pass.
    ///
    /// Never repeats the previous pick unless only one region is
    /// available.
    fn round_robin(&self, service_id: &str, available: &[RegionId]) -> Option<RegionId> {
        if available.is_empty() {
            return None;
        }
        let mut last_map = self.last_selected.lock().unwrap();
        let choice = match last_map.get(service_id) {
            Some(last) => match available.iter().position(|r| r == last) {
                Some(idx) => available[(idx + 1) % available.len()].clone(),
                // Last pick is gone from the pool; start over.
                None => available[0].clone(),
            },
            None => available[0].clone(),
        };
        last_map.insert(service_id.to_string(), choice.clone());
        Some(choice)
    }

    /// Nearest region plus a standby on another continent.
    ///
    /// The standby must not share the primary's continent; when every
    /// available region does, the selection stays single-region.
    fn failover(&self, service: &ServiceDefinition, available: &[RegionId]) -> Vec<RegionId> {
        let Some(primary) = self.closest(service, available) else {
            return Vec::new();
        };
        let primary_continent = self
            .catalog
            .get(&primary)
            .map(|r| r.continent.clone())
            .unwrap_or_default();

        let secondary = available
            .iter()
            .find(|id| {
                self.catalog
                    .get(id)
                    .is_some_and(|r| r.continent != primary_continent)
            })
            .cloned();

        match secondary {
            Some(secondary) => vec![primary, secondary],
            None => vec![primary],
        }
    }

    /// Enforce the policy's min/max region bounds.
    ///
    /// Minimum shortfalls are backfilled from the available pool in
    /// lexicographic order; a pool too small to reach the minimum is a
    /// degrade, not an error.
    fn clamp(
        &self,
        service: &ServiceDefinition,
        mut selected: Vec<RegionId>,
        policy: &MonitoringPolicy,
        backfill_pool: &[RegionId],
    ) -> RoutingResult<Vec<RegionId>> {
        if let Some(min) = policy.min_regions {
            for region in backfill_pool {
                if selected.len() >= min as usize {
                    break;
                }
                if !selected.contains(region) {
                    selected.push(region.clone());
                }
            }
            if selected.len() < min as usize {
                warn!(
                    service_id = %service.id,
                    selected = selected.len(),
                    min_regions = min,
                    "available regions below policy minimum"
                );
            }
        }
        if let Some(max) = policy.max_regions {
            selected.truncate(max as usize);
        }
        if selected.is_empty() {
            return Err(RoutingError::NoAvailableRegion(service.id.clone()));
        }
        Ok(selected)
    }

    fn region_distance_km(&self, region_id: &str, target: &Coordinates) -> f64 {
        self.catalog
            .get(region_id)
            .map(|r| r.coordinates.haversine_km(target))
            .unwrap_or(f64::MAX)
    }
}
