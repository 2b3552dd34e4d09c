//! Domain types for the GuardAnt coordination core.
//!
//! These types represent workers, monitored services, check results,
//! incidents, and the routing policies that connect them. Everything that
//! crosses a process boundary (registry records, queue payloads, result
//! messages) serializes to camelCase JSON; the same serde derives feed the
//! redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a monitored service.
pub type ServiceId = String;

/// Unique identifier for a tenant ("nest").
pub type NestId = String;

/// Unique identifier for a monitoring worker.
pub type WorkerId = String;

/// Identifier of a monitoring region (e.g. `eu-west-1`).
pub type RegionId = String;

/// Mean Earth radius in kilometers, used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// ── Geography ──────────────────────────────────────────────────────

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Great-circle distance to `other` in kilometers (haversine formula).
    pub fn haversine_km(&self, other: &Coordinates) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// Where a worker (or region) physically sits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    pub continent: String,
    pub country: String,
    pub city: String,
    pub coordinates: Coordinates,
}

/// A monitoring region: a named point of presence workers deploy into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringRegion {
    pub id: RegionId,
    pub name: String,
    pub continent: String,
    pub country: String,
    pub city: String,
    pub coordinates: Coordinates,
}

// ── Workers ────────────────────────────────────────────────────────

/// Kinds of checks a worker can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Web,
    Tcp,
    Ping,
    Dns,
}

impl ServiceType {
    /// Lowercase name as it appears on the wire and in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Web => "web",
            ServiceType::Tcp => "tcp",
            ServiceType::Ping => "ping",
            ServiceType::Dns => "dns",
        }
    }
}

/// Per-worker execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLimits {
    /// Maximum checks the worker runs concurrently.
    pub max_concurrency: u32,
}

/// What a worker is capable of executing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCapabilities {
    pub service_types: Vec<ServiceType>,
    pub limits: WorkerLimits,
}

/// Network identity of a worker, as far as it could discover it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
}

/// Rolling liveness and load counters, refreshed by worker heartbeats.
///
/// All timestamps are unix epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub started_at: u64,
    pub last_heartbeat: u64,
    pub checks_completed: u64,
    pub checks_failed: u64,
    /// Checks the worker is running right now (lowest wins scoring ties).
    #[serde(default)]
    pub active_checks: u32,
}

/// A monitoring worker as published in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNode {
    pub id: WorkerId,
    pub name: String,
    pub version: String,
    /// Region the worker is deployed into.
    pub region: RegionId,
    pub location: GeoLocation,
    pub capabilities: WorkerCapabilities,
    #[serde(default)]
    pub network: NetworkInfo,
    pub status: WorkerStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkerNode {
    /// Fraction of completed checks that failed, in `[0.0, 1.0]`.
    pub fn failure_rate(&self) -> f64 {
        if self.status.checks_completed == 0 {
            return 0.0;
        }
        self.status.checks_failed as f64 / self.status.checks_completed as f64
    }
}

/// Heartbeat payload: the load counters a worker reports about itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerLoad {
    pub active_checks: u32,
    pub checks_completed: u64,
    pub checks_failed: u64,
}

/// Registry record: a worker plus the lease it lives under.
///
/// The registry treats `expires_at` (epoch ms) as the worker's TTL;
/// heartbeats extend it, reads past it see nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredWorker {
    pub expires_at: u64,
    pub node: WorkerNode,
}

// ── Services & routing policy ──────────────────────────────────────

/// How a service's monitoring regions are chosen each scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Every configured region that currently has a live worker.
    AllSelected,
    /// The region nearest to the monitored target.
    Closest,
    /// Rotate through configured regions, one per pass.
    #[default]
    RoundRobin,
    /// Nearest region plus a standby on another continent.
    Failover,
}

/// Per-service region selection policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringPolicy {
    /// Preferred region ids, in tenant-configured order.
    #[serde(default)]
    pub regions: Vec<RegionId>,
    #[serde(default)]
    pub strategy: RoutingStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_regions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_regions: Option<u32>,
}

/// A monitored service as the scheduler sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub id: ServiceId,
    pub nest_id: NestId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// What to probe: a URL, host:port, hostname, etc.
    pub target: String,
    /// Opaque probe configuration passed through to the executor.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
    /// Seconds between checks.
    pub interval: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub monitoring: MonitoringPolicy,
}

fn default_enabled() -> bool {
    true
}

impl ServiceDefinition {
    /// Deduplication key for a check of this service in one region.
    pub fn job_key(&self, region: &str) -> String {
        format!("check-{}-{}", self.id, region)
    }
}

/// Tenant subscription tier, which maps to job priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Enterprise,
    Pro,
    Free,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SubscriptionTier {
    /// Queue priority for this tier; lower numbers dequeue first.
    pub fn job_priority(&self) -> u8 {
        match self {
            SubscriptionTier::Enterprise => 1,
            SubscriptionTier::Pro => 5,
            SubscriptionTier::Free => 8,
            SubscriptionTier::Unknown => 10,
        }
    }
}

// ── Check results ──────────────────────────────────────────────────

/// Outcome class of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Degraded,
    Error,
}

impl CheckStatus {
    /// Only `down` opens incidents; `degraded` and `error` do not.
    pub fn is_down(&self) -> bool {
        matches!(self, CheckStatus::Down)
    }

    /// Lowercase name as it appears on the wire and in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Degraded => "degraded",
            CheckStatus::Error => "error",
        }
    }
}

/// A single check result as published upstream.
///
/// `timestamp` is unix epoch milliseconds at probe completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub service_id: ServiceId,
    pub nest_id: NestId,
    pub status: CheckStatus,
    /// Probe round-trip in milliseconds; absent when the probe never connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    pub timestamp: u64,
    pub worker_id: WorkerId,
    pub region: RegionId,
    /// Correlates one-shot checks with their requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CheckResult {
    /// Key into the short-lived status table.
    pub fn status_key(&self) -> String {
        format!("{}:{}", self.nest_id, self.service_id)
    }
}

/// Outbox entry: a result awaiting upstream delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    pub result: CheckResult,
    pub retry_count: u32,
    /// Epoch ms before which no redelivery is attempted.
    pub next_retry_at: u64,
}

/// Status-table record: a result plus its expiry lease (epoch ms).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedStatus {
    pub expires_at: u64,
    pub result: CheckResult,
}

// ── Incidents ──────────────────────────────────────────────────────

/// An open or resolved availability incident for one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub service_id: ServiceId,
    pub nest_id: NestId,
    /// Epoch ms of the check that opened the incident.
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    pub reason: String,
}

impl Incident {
    /// Build the composite key for the incidents table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.nest_id, self.service_id)
    }
}
