//! guardant-queue — shared monitoring job queue.
//!
//! Jobs flow from the dispatcher to worker runtimes through a single
//! in-process queue with key deduplication, priority ordering, and
//! attempt-counted redelivery. Settled jobs land in bounded ledgers so
//! operators can see what completed and what was dropped.

pub mod error;
pub mod job;
pub mod ledger;
pub mod memory;

pub use error::{QueueError, QueueResult};
pub use job::{Delivery, JobOutcome, JobRecord, MonitoringJob, Receipt};
pub use ledger::{JobLedger, RetentionConfig};
pub use memory::{MemoryQueue, QueueStats};
