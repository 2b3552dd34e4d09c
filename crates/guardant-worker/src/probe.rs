//! Probe executor seam.
//!
//! Real protocol probes (HTTP, TCP, ICMP, DNS) live behind this trait;
//! the runtime only cares about the outcome triple.

use async_trait::async_trait;

use guardant_state::{CheckStatus, NestId, ServiceId, ServiceType};

/// The probe-relevant slice of a service definition, as carried by
/// `monitor_service` and `check_service_once` commands.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSpec {
    pub service_id: ServiceId,
    pub nest_id: NestId,
    pub service_type: ServiceType,
    pub target: String,
    pub config: serde_json::Value,
}

/// What a single probe run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub status: CheckStatus,
    /// Probe round-trip in milliseconds, when the target answered.
    pub response_time: Option<u64>,
    pub error_message: Option<String>,
}

impl ProbeOutcome {
    pub fn up(response_time: u64) -> Self {
        Self {
            status: CheckStatus::Up,
            response_time: Some(response_time),
            error_message: None,
        }
    }

    pub fn down(error_message: &str) -> Self {
        Self {
            status: CheckStatus::Down,
            response_time: None,
            error_message: Some(error_message.to_string()),
        }
    }
}

/// Executes one probe against a target.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn check(&self, spec: &CheckSpec) -> ProbeOutcome;
}

/// Executor that returns a fixed outcome. Stands in for real probes in
/// the standalone daemon and in tests.
pub struct StubExecutor {
    outcome: ProbeOutcome,
}

impl StubExecutor {
    /// Every check reports `up` with a nominal response time.
    pub fn always_up() -> Self {
        Self::returning(ProbeOutcome::up(25))
    }

    pub fn returning(outcome: ProbeOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl ProbeExecutor for StubExecutor {
    async fn check(&self, _spec: &CheckSpec) -> ProbeOutcome {
        self.outcome.clone()
    }
}
