//! Check metrics — per-service counters fed by the worker pipeline.
//!
//! Uses a lock-free design with atomics for counters; services are
//! registered on their first sample.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use guardant_state::{CheckStatus, NestId, RegionId, ServiceId, ServiceType};

/// One observation per completed check.
#[derive(Debug, Clone)]
pub struct CheckSample {
    pub nest_id: NestId,
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub region: RegionId,
    pub duration_seconds: f64,
    pub service_type: ServiceType,
}

/// What the last sample for a service looked like.
struct LastSeen {
    status: CheckStatus,
    region: RegionId,
    service_type: ServiceType,
}

/// Per-service counter bucket.
struct ServiceCounters {
    up: AtomicU64,
    down: AtomicU64,
    degraded: AtomicU64,
    error: AtomicU64,
    /// Probe durations, accumulated in microseconds.
    duration_micros: AtomicU64,
    samples: AtomicU64,
    last: std::sync::Mutex<LastSeen>,
}

impl ServiceCounters {
    fn new(sample: &CheckSample) -> Self {
        Self {
            up: AtomicU64::new(0),
            down: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            error: AtomicU64::new(0),
            duration_micros: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            last: std::sync::Mutex::new(LastSeen {
                status: sample.status,
                region: sample.region.clone(),
                service_type: sample.service_type,
            }),
        }
    }

    fn observe(&self, sample: &CheckSample) {
        match sample.status {
            CheckStatus::Up => self.up.fetch_add(1, Ordering::Relaxed),
            CheckStatus::Down => self.down.fetch_add(1, Ordering::Relaxed),
            CheckStatus::Degraded => self.degraded.fetch_add(1, Ordering::Relaxed),
            CheckStatus::Error => self.error.fetch_add(1, Ordering::Relaxed),
        };
        self.duration_micros
            .fetch_add((sample.duration_seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last.lock().unwrap();
        last.status = sample.status;
        last.region = sample.region.clone();
        last.service_type = sample.service_type;
    }
}

/// Point-in-time view of one service's counters, for rendering.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheckSnapshot {
    pub nest_id: NestId,
    pub service_id: ServiceId,
    pub service_type: ServiceType,
    pub up: u64,
    pub down: u64,
    pub degraded: u64,
    pub error: u64,
    pub duration_seconds_sum: f64,
    pub samples: u64,
    pub last_status: CheckStatus,
    pub last_region: RegionId,
}

/// Collects check outcomes across all services.
pub struct CheckMetrics {
    /// Per-service counters: (nest, service) → bucket.
    metrics: RwLock<HashMap<(NestId, ServiceId), Arc<ServiceCounters>>>,
}

impl CheckMetrics {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Record one check outcome, registering the service on first sight.
    pub async fn record(&self, sample: &CheckSample) {
        let key = (sample.nest_id.clone(), sample.service_id.clone());
        {
            let metrics = self.metrics.read().await;
            if let Some(counters) = metrics.get(&key) {
                counters.observe(sample);
                return;
            }
        }

        let mut metrics = self.metrics.write().await;
        let counters = metrics
            .entry(key)
            .or_insert_with(|| {
                debug!(
                    nest_id = %sample.nest_id,
                    service_id = %sample.service_id,
                    "registered service for check metrics"
                );
                Arc::new(ServiceCounters::new(sample))
            })
            .clone();
        counters.observe(sample);
    }

    /// Snapshot every tracked service, ordered for stable rendering.
    pub async fn snapshot(&self) -> Vec<ServiceCheckSnapshot> {
        let metrics = self.metrics.read().await;
        let mut out: Vec<ServiceCheckSnapshot> = metrics
            .iter()
            .map(|((nest_id, service_id), c)| {
                let last = c.last.lock().unwrap();
                ServiceCheckSnapshot {
                    nest_id: nest_id.clone(),
                    service_id: service_id.clone(),
                    service_type: last.service_type,
                    up: c.up.load(Ordering::Relaxed),
                    down: c.down.load(Ordering::Relaxed),
                    degraded: c.degraded.load(Ordering::Relaxed),
                    error: c.error.load(Ordering::Relaxed),
                    duration_seconds_sum: c.duration_micros.load(Ordering::Relaxed) as f64
                        / 1_000_000.0,
                    samples: c.samples.load(Ordering::Relaxed),
                    last_status: last.status,
                    last_region: last.region.clone(),
                }
            })
            .collect();
        out.sort_by(|a, b| {
            (&a.nest_id, &a.service_id).cmp(&(&b.nest_id, &b.service_id))
        });
        out
    }

    /// Number of services with at least one recorded check.
    pub async fn tracked_services(&self) -> usize {
        self.metrics.read().await.len()
    }
}

impl Default for CheckMetrics {
    fn default() -> Self {
        Self::new()
    }
}
