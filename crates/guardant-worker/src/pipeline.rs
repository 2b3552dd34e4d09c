//! Check pipeline — everything that happens after a probe fires.
//!
//! One run: invoke the probe executor, build the result, write the
//! short-lived status cache, hand the result to the outbox, record a
//! metric sample, and feed the incident manager. Delivery faults are
//! logged, never propagated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use guardant_incident::IncidentManager;
use guardant_metrics::{CheckMetrics, CheckSample};
use guardant_outbox::ResultOutbox;
use guardant_state::{CheckResult, CheckStatus, RegionId, StateStore, WorkerId, WorkerLoad};

use crate::probe::{CheckSpec, ProbeExecutor};

/// Live check counters, shared with the heartbeat loop.
#[derive(Default)]
pub struct CheckStats {
    completed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
}

impl CheckStats {
    /// Snapshot as a heartbeat payload.
    pub fn load(&self) -> WorkerLoad {
        WorkerLoad {
            active_checks: self.active.load(Ordering::Relaxed) as u32,
            checks_completed: self.completed.load(Ordering::Relaxed),
            checks_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs checks for one worker and fans the results out.
pub struct CheckPipeline {
    worker_id: WorkerId,
    region: RegionId,
    executor: Arc<dyn ProbeExecutor>,
    store: StateStore,
    outbox: Arc<ResultOutbox>,
    metrics: Arc<CheckMetrics>,
    incidents: Arc<IncidentManager>,
    stats: Arc<CheckStats>,
}

impl CheckPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: WorkerId,
        region: RegionId,
        executor: Arc<dyn ProbeExecutor>,
        store: StateStore,
        outbox: Arc<ResultOutbox>,
        metrics: Arc<CheckMetrics>,
        incidents: Arc<IncidentManager>,
    ) -> Self {
        Self {
            worker_id,
            region,
            executor,
            store,
            outbox,
            metrics,
            incidents,
            stats: Arc::new(CheckStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CheckStats> {
        self.stats.clone()
    }

    /// Run one check end to end and return the result.
    pub async fn run_check(&self, spec: &CheckSpec, cache_key: Option<String>) -> CheckResult {
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let outcome = self.executor.check(spec).await;
        let duration = started.elapsed();
        self.stats.active.fetch_sub(1, Ordering::Relaxed);

        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        if outcome.status != CheckStatus::Up {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        let now_ms = epoch_ms();
        let result = CheckResult {
            service_id: spec.service_id.clone(),
            nest_id: spec.nest_id.clone(),
            status: outcome.status,
            response_time: outcome.response_time,
            timestamp: now_ms,
            worker_id: self.worker_id.clone(),
            region: self.region.clone(),
            cache_key,
            error_message: outcome.error_message,
        };
        debug!(
            service_id = %spec.service_id,
            status = result.status.as_str(),
            response_time = ?result.response_time,
            "check completed"
        );

        if let Err(e) = self.store.put_status(&result, now_ms) {
            warn!(error = %e, service_id = %spec.service_id, "status cache write failed");
        }
        self.outbox.submit(result.clone(), now_ms).await;
        self.metrics
            .record(&CheckSample {
                nest_id: spec.nest_id.clone(),
                service_id: spec.service_id.clone(),
                status: result.status,
                region: self.region.clone(),
                duration_seconds: duration.as_secs_f64(),
                service_type: spec.service_type,
            })
            .await;
        if let Err(e) = self.incidents.observe(&result).await {
            warn!(error = %e, service_id = %spec.service_id, "incident tracking failed");
        }
        result
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Ready-made pipeline for tests in sibling modules.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::probe::StubExecutor;
    use guardant_incident::LogNotifier;
    use guardant_outbox::{LogSink, OutboxConfig};

    pub(crate) fn make_test_pipeline() -> (Arc<CheckPipeline>, Arc<CheckStats>) {
        let store = StateStore::open_in_memory().unwrap();
        let outbox = Arc::new(ResultOutbox::new(OutboxConfig::default(), Arc::new(LogSink)));
        let metrics = Arc::new(CheckMetrics::new());
        let incidents = Arc::new(IncidentManager::new(store.clone(), Arc::new(LogNotifier)));
        let pipeline = Arc::new(CheckPipeline::new(
            "worker-1".to_string(),
            "eu-west-1".to_string(),
            Arc::new(StubExecutor::always_up()),
            store,
            outbox,
            metrics,
            incidents,
        ));
        let stats = pipeline.stats();
        (pipeline, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeOutcome, StubExecutor};
    use async_trait::async_trait;
    use guardant_incident::LogNotifier;
    use guardant_outbox::{OutboxConfig, ResultSink, SinkError};
    use guardant_state::ServiceType;

    struct RecordingSink {
        published: std::sync::Mutex<Vec<CheckResult>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                published: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn published(&self) -> Vec<CheckResult> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn publish(&self, result: &CheckResult) -> Result<(), SinkError> {
            self.published.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    struct Fixture {
        pipeline: CheckPipeline,
        store: StateStore,
        metrics: Arc<CheckMetrics>,
        incidents: Arc<IncidentManager>,
        sink: Arc<RecordingSink>,
    }

    fn make_pipeline(executor: StubExecutor) -> Fixture {
        let store = StateStore::open_in_memory().unwrap();
        let sink = RecordingSink::new();
        let outbox = Arc::new(ResultOutbox::new(OutboxConfig::default(), sink.clone()));
        let metrics = Arc::new(CheckMetrics::new());
        let incidents = Arc::new(IncidentManager::new(store.clone(), Arc::new(LogNotifier)));
        let pipeline = CheckPipeline::new(
            "worker-1".to_string(),
            "eu-west-1".to_string(),
            Arc::new(executor),
            store.clone(),
            outbox,
            metrics.clone(),
            incidents.clone(),
        );
        Fixture {
            pipeline,
            store,
            metrics,
            incidents,
            sink,
        }
    }

    fn make_spec(service_id: &str) -> CheckSpec {
        CheckSpec {
            service_id: service_id.to_string(),
            nest_id: "nest-1".to_string(),
            service_type: ServiceType::Web,
            target: "https://example.com".to_string(),
            config: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn successful_check_fans_out_everywhere() {
        let f = make_pipeline(StubExecutor::always_up());
        let result = f.pipeline.run_check(&make_spec("svc-1"), None).await;

        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(result.worker_id, "worker-1");
        assert_eq!(result.region, "eu-west-1");
        assert_eq!(result.response_time, Some(25));

        // Status cache was written.
        let cached = f
            .store
            .get_status("nest-1", "svc-1", result.timestamp)
            .unwrap();
        assert_eq!(cached.map(|c| c.status), Some(CheckStatus::Up));

        // Result reached the sink, metrics, and left no incident.
        assert_eq!(f.sink.published().len(), 1);
        let snaps = f.metrics.snapshot().await;
        assert_eq!(snaps[0].up, 1);
        assert!(f.incidents.open_incidents().unwrap().is_empty());

        let load = f.pipeline.stats().load();
        assert_eq!(load.checks_completed, 1);
        assert_eq!(load.checks_failed, 0);
        assert_eq!(load.active_checks, 0);
    }

    #[tokio::test]
    async fn down_check_opens_incident_and_counts_failed() {
        let f = make_pipeline(StubExecutor::returning(ProbeOutcome::down(
            "connection refused",
        )));
        let result = f.pipeline.run_check(&make_spec("svc-1"), None).await;

        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.error_message.as_deref(), Some("connection refused"));

        let open = f.incidents.open_incidents().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].reason, "connection refused");

        let load = f.pipeline.stats().load();
        assert_eq!(load.checks_completed, 1);
        assert_eq!(load.checks_failed, 1);
    }

    #[tokio::test]
    async fn cache_key_rides_along() {
        let f = make_pipeline(StubExecutor::always_up());
        let result = f
            .pipeline
            .run_check(&make_spec("svc-1"), Some("adhoc-7".to_string()))
            .await;

        assert_eq!(result.cache_key.as_deref(), Some("adhoc-7"));
        assert_eq!(f.sink.published()[0].cache_key.as_deref(), Some("adhoc-7"));
    }
}
