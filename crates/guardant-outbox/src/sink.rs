//! Result sink — the upstream channel check results are published to.
//!
//! The outbox only needs a publish seam; what sits behind it (a broker,
//! an HTTP ingest endpoint, a log) is the embedder's choice.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use guardant_state::CheckResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("result channel unavailable: {0}")]
    Unavailable(String),
}

/// Upstream destination for check results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, result: &CheckResult) -> Result<(), SinkError>;
}

/// Sink that logs each result. The standalone default.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn publish(&self, result: &CheckResult) -> Result<(), SinkError> {
        info!(
            service_id = %result.service_id,
            nest_id = %result.nest_id,
            status = ?result.status,
            region = %result.region,
            "check result"
        );
        Ok(())
    }
}
