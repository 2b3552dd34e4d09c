//! Result outbox — durable buffer between the check loop and the
//! result channel.
//!
//! Results are published directly while the channel is healthy. On the
//! first publish failure the outbox goes offline: new results are
//! buffered (bounded, oldest evicted) and mirrored to a local file, and
//! a periodic flush retries them with exponential backoff until the
//! channel comes back. Only retry exhaustion ever discards a result,
//! and it is always logged.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use guardant_state::{CachedResult, CheckResult, RetryPolicy};

use crate::error::{OutboxError, OutboxResult};
use crate::sink::ResultSink;

/// Tuning for the outbox buffer and redelivery.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Buffered results beyond this trigger eviction of the oldest tenth.
    pub max_cache_size: usize,
    /// How often buffered results are retried.
    pub flush_interval: Duration,
    /// Backoff schedule for redelivery attempts.
    pub retry: RetryPolicy,
    /// On-disk mirror of the buffer; `None` keeps it memory-only.
    pub path: Option<PathBuf>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 1000,
            flush_interval: Duration::from_secs(60),
            retry: RetryPolicy::outbox_default(),
            path: None,
        }
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxStats {
    pub buffered: usize,
    pub online: bool,
    pub delivered: u64,
    pub dropped: u64,
}

struct OutboxState {
    buffer: Vec<CachedResult>,
    /// Whether direct publish is currently attempted.
    online: bool,
    delivered: u64,
    dropped: u64,
}

/// At-least-once delivery of check results to a [`ResultSink`].
pub struct ResultOutbox {
    sink: Arc<dyn ResultSink>,
    config: OutboxConfig,
    state: Mutex<OutboxState>,
}

impl ResultOutbox {
    /// Create an outbox, restoring any buffer persisted by a previous run.
    pub fn new(config: OutboxConfig, sink: Arc<dyn ResultSink>) -> Self {
        let buffer = match &config.path {
            Some(path) if path.exists() => match load_file(path) {
                Ok(entries) => {
                    if !entries.is_empty() {
                        info!(count = entries.len(), "restored buffered results from disk");
                    }
                    entries
                }
                Err(e) => {
                    warn!(error = %e, "could not restore buffered results, starting empty");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };
        Self {
            sink,
            config,
            state: Mutex::new(OutboxState {
                buffer,
                online: true,
                delivered: 0,
                dropped: 0,
            }),
        }
    }

    /// Hand over one result for delivery.
    ///
    /// While online this publishes directly; a failure flips the outbox
    /// offline and buffers. While offline everything is buffered without
    /// touching the sink, so a dead channel is not hammered per check.
    pub async fn submit(&self, result: CheckResult, now_ms: u64) {
        let mut state = self.state.lock().await;
        if state.online {
            match self.sink.publish(&result).await {
                Ok(()) => {
                    state.delivered += 1;
                    return;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        service_id = %result.service_id,
                        "direct result publish failed, buffering until channel recovers"
                    );
                    state.online = false;
                }
            }
        }
        self.buffer_result(&mut state, result, now_ms);
        self.persist_state(&state);
    }

    /// Retry buffered results that are due.
    ///
    /// Returns how many were delivered. The first success flips the
    /// outbox back online. Entries whose retries are exhausted are
    /// dropped here, each with a warning carrying its identity and
    /// retry history.
    pub async fn flush(&self, now_ms: u64) -> usize {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return 0;
        }

        let entries = std::mem::take(&mut state.buffer);
        let mut delivered = 0usize;
        let mut changed = false;
        for mut entry in entries {
            if self.config.retry.exhausted(entry.retry_count) {
                warn!(
                    service_id = %entry.result.service_id,
                    timestamp = entry.result.timestamp,
                    retries = entry.retry_count,
                    "dropping buffered result, retries exhausted"
                );
                state.dropped += 1;
                changed = true;
                continue;
            }
            if entry.next_retry_at > now_ms {
                state.buffer.push(entry);
                continue;
            }
            match self.sink.publish(&entry.result).await {
                Ok(()) => {
                    if !state.online {
                        info!("result channel restored, resuming direct publish");
                        state.online = true;
                    }
                    state.delivered += 1;
                    delivered += 1;
                    changed = true;
                }
                Err(e) => {
                    entry.retry_count += 1;
                    entry.next_retry_at =
                        self.config.retry.next_attempt_at(now_ms, entry.retry_count);
                    debug!(
                        error = %e,
                        service_id = %entry.result.service_id,
                        retries = entry.retry_count,
                        "result redelivery failed"
                    );
                    state.buffer.push(entry);
                    changed = true;
                }
            }
        }
        if changed {
            self.persist_state(&state);
        }
        if delivered > 0 {
            info!(
                delivered,
                remaining = state.buffer.len(),
                "flushed buffered results"
            );
        }
        delivered
    }

    /// Write the current buffer to disk, if a path is configured.
    pub async fn persist(&self) -> OutboxResult<()> {
        let state = self.state.lock().await;
        self.write_state(&state)
    }

    pub async fn stats(&self) -> OutboxStats {
        let state = self.state.lock().await;
        OutboxStats {
            buffered: state.buffer.len(),
            online: state.online,
            delivered: state.delivered,
            dropped: state.dropped,
        }
    }

    /// Run the flush loop until shutdown, then flush once more and
    /// persist whatever remains.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.flush_interval.as_secs(),
            "result outbox started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.flush_interval) => {
                    self.flush(epoch_ms()).await;
                }
                _ = shutdown.changed() => {
                    info!("result outbox shutting down");
                    self.flush(epoch_ms()).await;
                    if let Err(e) = self.persist().await {
                        error!(error = %e, "final outbox persist failed");
                    }
                    break;
                }
            }
        }
    }

    fn buffer_result(&self, state: &mut OutboxState, result: CheckResult, now_ms: u64) {
        if state.buffer.len() + 1 > self.config.max_cache_size {
            let evict = (self.config.max_cache_size / 10).max(1).min(state.buffer.len());
            state.buffer.sort_by_key(|entry| entry.result.timestamp);
            state.buffer.drain(..evict);
            state.dropped += evict as u64;
            warn!(evicted = evict, "result cache full, evicted oldest entries");
        }
        state.buffer.push(CachedResult {
            result,
            retry_count: 0,
            next_retry_at: now_ms,
        });
    }

    fn persist_state(&self, state: &OutboxState) {
        if let Err(e) = self.write_state(state) {
            error!(error = %e, "failed to persist result cache");
        }
    }

    fn write_state(&self, state: &OutboxState) -> OutboxResult<()> {
        let Some(path) = &self.config.path else {
            return Ok(());
        };
        let json = serde_json::to_vec(&state.buffer)
            .map_err(|e| OutboxError::Persist(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(|e| OutboxError::Persist(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| OutboxError::Persist(e.to_string()))?;
        Ok(())
    }
}

fn load_file(path: &Path) -> OutboxResult<Vec<CachedResult>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| OutboxError::Load(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| OutboxError::Load(e.to_string()))
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
