//! MemoryQueue — the shared monitoring job queue, in process.
//!
//! Implements the queue contract the dispatcher and workers agree on:
//! key deduplication, priority ordering, one unacknowledged delivery per
//! consumer, attempt-counted redelivery with exponential backoff, and a
//! bounded ledger of settled jobs. Lock hold time is short; waiting
//! consumers park on a `Notify` and wake on publish or when the next
//! retry becomes due.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;
use tracing::{debug, warn};

use guardant_state::RetryPolicy;

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, JobOutcome, JobRecord, MonitoringJob, Receipt};
use crate::ledger::{JobLedger, RetentionConfig};

/// How long an idle consumer sleeps between eligibility checks.
const IDLE_POLL_MS: u64 = 500;

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct PendingJob {
    job: MonitoringJob,
    /// Deliveries so far.
    attempts: u32,
    /// Epoch ms before which this job is not eligible.
    next_attempt_at: u64,
    /// Publish order; breaks priority ties FIFO.
    seq: u64,
}

#[derive(Debug)]
struct InFlight {
    job: MonitoringJob,
    consumer: String,
    attempts: u32,
}

struct QueueInner {
    pending: Vec<PendingJob>,
    in_flight: HashMap<u64, InFlight>,
    /// Keys of pending and in-flight jobs, for deduplication.
    keys: HashSet<String>,
    /// Consumers holding an unacknowledged delivery.
    busy_consumers: HashSet<String>,
    completed: JobLedger,
    failed: JobLedger,
    next_seq: u64,
    next_token: u64,
}

/// Shared in-process job queue.
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    retry: RetryPolicy,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_config(RetryPolicy::queue_default(), RetentionConfig::default())
    }

    pub fn with_config(retry: RetryPolicy, retention: RetentionConfig) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: Vec::new(),
                in_flight: HashMap::new(),
                keys: HashSet::new(),
                busy_consumers: HashSet::new(),
                completed: JobLedger::new(retention),
                failed: JobLedger::new(retention),
                next_seq: 0,
                next_token: 0,
            }),
            notify: Notify::new(),
            retry,
        }
    }

    /// Publish a job unless one with the same key is already pending or
    /// in flight. Returns true when the job was enqueued.
    pub fn publish(&self, job: MonitoringJob, now_ms: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.keys.contains(&job.key) {
            debug!(key = %job.key, "duplicate job collapsed");
            return false;
        }
        inner.keys.insert(job.key.clone());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.pending.push(PendingJob { job, attempts: 0, next_attempt_at: now_ms, seq });
        drop(inner);
        self.notify.notify_waiters();
        true
    }

    /// Take the best eligible job for `consumer`, if any.
    ///
    /// "Best" is lowest priority number, then publish order. A consumer
    /// with an unacknowledged delivery may not take another.
    pub fn try_consume(&self, consumer: &str, now_ms: u64) -> QueueResult<Option<Delivery>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.busy_consumers.contains(consumer) {
            return Err(QueueError::InFlightLimit(consumer.to_string()));
        }

        let best = inner
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.next_attempt_at <= now_ms)
            .min_by_key(|(_, p)| (p.job.priority, p.seq))
            .map(|(idx, _)| idx);
        let Some(idx) = best else {
            return Ok(None);
        };

        let mut pending = inner.pending.swap_remove(idx);
        pending.attempts += 1;
        let token = inner.next_token;
        inner.next_token += 1;
        let delivery = Delivery {
            job: pending.job.clone(),
            receipt: Receipt { consumer: consumer.to_string(), token },
            attempt: pending.attempts,
        };
        inner.in_flight.insert(
            token,
            InFlight {
                job: pending.job,
                consumer: consumer.to_string(),
                attempts: pending.attempts,
            },
        );
        inner.busy_consumers.insert(consumer.to_string());
        Ok(Some(delivery))
    }

    /// Wait for the next eligible job for `consumer`.
    pub async fn consume(&self, consumer: &str) -> QueueResult<Delivery> {
        loop {
            let now_ms = epoch_ms();
            if let Some(delivery) = self.try_consume(consumer, now_ms)? {
                return Ok(delivery);
            }
            let wait = self.next_wake_ms(now_ms).unwrap_or(IDLE_POLL_MS).clamp(1, IDLE_POLL_MS);
            let _ = tokio::time::timeout(Duration::from_millis(wait), self.notify.notified()).await;
        }
    }

    /// Acknowledge a delivery: the job is done and leaves the queue.
    pub fn ack(&self, receipt: &Receipt, now_ms: u64) -> QueueResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let settled = inner
            .in_flight
            .remove(&receipt.token)
            .ok_or(QueueError::UnknownReceipt(receipt.token))?;
        inner.busy_consumers.remove(&settled.consumer);
        inner.keys.remove(&settled.job.key);
        let record = JobRecord {
            key: settled.job.key,
            outcome: JobOutcome::Completed,
            attempts: settled.attempts,
            finished_at: now_ms,
        };
        inner.completed.push(record, now_ms);
        Ok(())
    }

    /// Reject a delivery.
    ///
    /// With `requeue`, the job is redelivered after the retry policy's
    /// backoff until its attempts are exhausted. Without it the job is
    /// poison and settles failed immediately.
    pub fn nack(&self, receipt: &Receipt, requeue: bool, now_ms: u64) -> QueueResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let settled = inner
            .in_flight
            .remove(&receipt.token)
            .ok_or(QueueError::UnknownReceipt(receipt.token))?;
        inner.busy_consumers.remove(&settled.consumer);

        if !requeue {
            warn!(key = %settled.job.key, "job rejected as poison");
            inner.keys.remove(&settled.job.key);
            let record = JobRecord {
                key: settled.job.key,
                outcome: JobOutcome::Poisoned,
                attempts: settled.attempts,
                finished_at: now_ms,
            };
            inner.failed.push(record, now_ms);
        } else if settled.attempts >= self.retry.max_attempts {
            warn!(
                key = %settled.job.key,
                attempts = settled.attempts,
                "job retries exhausted"
            );
            inner.keys.remove(&settled.job.key);
            let record = JobRecord {
                key: settled.job.key,
                outcome: JobOutcome::Exhausted,
                attempts: settled.attempts,
                finished_at: now_ms,
            };
            inner.failed.push(record, now_ms);
        } else {
            // attempts is 1-based, delay_ms takes 0-based retry counts.
            let next_attempt_at = self.retry.next_attempt_at(now_ms, settled.attempts - 1);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.push(PendingJob {
                job: settled.job,
                attempts: settled.attempts,
                next_attempt_at,
                seq,
            });
        }
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            pending: inner.pending.len(),
            in_flight: inner.in_flight.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        }
    }

    pub fn completed_records(&self) -> Vec<JobRecord> {
        self.inner.lock().unwrap().completed.records()
    }

    pub fn failed_records(&self) -> Vec<JobRecord> {
        self.inner.lock().unwrap().failed.records()
    }

    /// Milliseconds until the earliest pending job becomes eligible.
    fn next_wake_ms(&self, now_ms: u64) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .pending
            .iter()
            .map(|p| p.next_attempt_at.saturating_sub(now_ms))
            .min()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(key: &str, priority: u8) -> MonitoringJob {
        MonitoringJob {
            key: key.to_string(),
            priority,
            region: "eu-west-1".to_string(),
            worker_hint: None,
            payload: serde_json::json!({"command": "monitor_service"}),
            created_at: 0,
        }
    }

    #[test]
    fn publish_collapses_duplicate_keys() {
        let queue = MemoryQueue::new();
        assert!(queue.publish(make_job("check-svc-1-eu-west-1", 5), 0));
        assert!(!queue.publish(make_job("check-svc-1-eu-west-1", 5), 0));

        assert_eq!(queue.stats().pending, 1);
    }

    #[test]
    fn dedup_spans_in_flight_jobs() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("check-svc-1-eu-west-1", 5), 0);
        let delivery = queue.try_consume("w1", 0).unwrap().unwrap();

        // Still active; the key stays reserved.
        assert!(!queue.publish(make_job("check-svc-1-eu-west-1", 5), 0));

        queue.ack(&delivery.receipt, 1).unwrap();
        assert!(queue.publish(make_job("check-svc-1-eu-west-1", 5), 1));
    }

    #[test]
    fn delivery_order_is_priority_then_fifo() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("free-a", 8), 0);
        queue.publish(make_job("free-b", 8), 0);
        queue.publish(make_job("enterprise", 1), 0);

        let first = queue.try_consume("w1", 0).unwrap().unwrap();
        assert_eq!(first.job.key, "enterprise");
        queue.ack(&first.receipt, 0).unwrap();

        let second = queue.try_consume("w1", 0).unwrap().unwrap();
        assert_eq!(second.job.key, "free-a");
        queue.ack(&second.receipt, 0).unwrap();

        let third = queue.try_consume("w1", 0).unwrap().unwrap();
        assert_eq!(third.job.key, "free-b");
    }

    #[test]
    fn one_unacked_delivery_per_consumer() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);
        queue.publish(make_job("b", 5), 0);

        let first = queue.try_consume("w1", 0).unwrap().unwrap();
        let err = queue.try_consume("w1", 0).unwrap_err();
        assert!(matches!(err, QueueError::InFlightLimit(_)));

        // Another consumer is unaffected.
        let other = queue.try_consume("w2", 0).unwrap().unwrap();
        assert_eq!(other.job.key, "b");

        queue.ack(&first.receipt, 0).unwrap();
        assert!(queue.try_consume("w1", 0).unwrap().is_none());
    }

    #[test]
    fn nack_requeues_after_backoff() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);

        let first = queue.try_consume("w1", 0).unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        queue.nack(&first.receipt, true, 0).unwrap();

        // Backoff starts at 2000ms; nothing is eligible before that.
        assert!(queue.try_consume("w1", 1_999).unwrap().is_none());
        let second = queue.try_consume("w1", 2_000).unwrap().unwrap();
        assert_eq!(second.attempt, 2);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);

        let first = queue.try_consume("w1", 0).unwrap().unwrap();
        queue.nack(&first.receipt, true, 0).unwrap();
        let second = queue.try_consume("w1", 2_000).unwrap().unwrap();
        queue.nack(&second.receipt, true, 2_000).unwrap();

        // Second retry waits 4000ms from the nack.
        assert!(queue.try_consume("w1", 5_999).unwrap().is_none());
        let third = queue.try_consume("w1", 6_000).unwrap().unwrap();
        assert_eq!(third.attempt, 3);
    }

    #[test]
    fn third_failure_settles_exhausted() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);

        let mut now = 0;
        for _ in 0..3 {
            let delivery = loop {
                if let Some(d) = queue.try_consume("w1", now).unwrap() {
                    break d;
                }
                now += 1_000;
            };
            queue.nack(&delivery.receipt, true, now).unwrap();
        }

        // Exhausted after the third failure: never delivered again.
        assert!(queue.try_consume("w1", now + 60_000).unwrap().is_none());
        let failed = queue.failed_records();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].outcome, JobOutcome::Exhausted);
        assert_eq!(failed[0].attempts, 3);

        // The key is free again for the next scheduling pass.
        assert!(queue.publish(make_job("a", 5), now));
    }

    #[test]
    fn poison_settles_immediately() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("bad", 5), 0);

        let delivery = queue.try_consume("w1", 0).unwrap().unwrap();
        queue.nack(&delivery.receipt, false, 0).unwrap();

        assert!(queue.try_consume("w1", 60_000).unwrap().is_none());
        let failed = queue.failed_records();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].outcome, JobOutcome::Poisoned);
        assert_eq!(failed[0].attempts, 1);
    }

    #[test]
    fn settle_twice_is_an_error() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);
        let delivery = queue.try_consume("w1", 0).unwrap().unwrap();

        queue.ack(&delivery.receipt, 0).unwrap();
        let err = queue.ack(&delivery.receipt, 0).unwrap_err();
        assert!(matches!(err, QueueError::UnknownReceipt(_)));
    }

    #[test]
    fn completed_ledger_records_attempts() {
        let queue = MemoryQueue::new();
        queue.publish(make_job("a", 5), 0);

        let first = queue.try_consume("w1", 0).unwrap().unwrap();
        queue.nack(&first.receipt, true, 0).unwrap();
        let second = queue.try_consume("w1", 2_000).unwrap().unwrap();
        queue.ack(&second.receipt, 2_500).unwrap();

        let completed = queue.completed_records();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].attempts, 2);
        assert_eq!(completed[0].finished_at, 2_500);
        assert_eq!(queue.stats().pending, 0);
        assert_eq!(queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn consume_wakes_on_publish() {
        use std::sync::Arc;

        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.consume("w1").await })
        };

        // Give the consumer a beat to park, then publish.
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish(make_job("a", 5), epoch_ms());

        let delivery = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("consumer should wake")
            .unwrap()
            .unwrap();
        assert_eq!(delivery.job.key, "a");
    }
}
