//! guardant-outbox — at-least-once delivery of check results.
//!
//! Workers hand every result to the outbox. While the upstream channel
//! is healthy results go straight through; while it is down they are
//! buffered in memory, mirrored to disk, and redelivered with backoff.
//! Loss is possible only at the capacity bound and at retry exhaustion,
//! and both paths log what was discarded.

pub mod error;
pub mod outbox;
pub mod sink;

pub use error::{OutboxError, OutboxResult};
pub use outbox::{OutboxConfig, OutboxStats, ResultOutbox};
pub use sink::{LogSink, ResultSink, SinkError};
