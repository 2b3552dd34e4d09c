//! Job and delivery types for the monitoring queue.

use serde::{Deserialize, Serialize};

use guardant_state::{RegionId, WorkerId};

/// A unit of monitoring work published by the dispatcher.
///
/// The payload is an opaque command document; consumers parse it and
/// reject what they cannot understand. `key` deduplicates: at most one
/// job per key is pending or in flight at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringJob {
    /// Deduplication key, `check-{serviceId}-{regionId}`.
    pub key: String,
    /// Queue priority; lower numbers dequeue first.
    pub priority: u8,
    /// Region the check should run from (broker routing hint).
    pub region: RegionId,
    /// Preferred worker, when placement picked one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_hint: Option<WorkerId>,
    /// Command envelope, JSON-encoded.
    pub payload: serde_json::Value,
    /// Epoch ms when the dispatcher created the job.
    pub created_at: u64,
}

/// Handle identifying one delivery of one job to one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub consumer: String,
    pub token: u64,
}

/// A job handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: MonitoringJob,
    pub receipt: Receipt,
    /// 1-based delivery attempt for this job.
    pub attempt: u32,
}

/// Terminal state of a settled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    /// Failed on every allowed delivery attempt.
    Exhausted,
    /// Rejected without requeue (unparseable or unprocessable).
    Poisoned,
}

/// Bounded-retention record of a settled job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub key: String,
    pub outcome: JobOutcome,
    pub attempts: u32,
    pub finished_at: u64,
}
