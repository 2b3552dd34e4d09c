//! guardant-worker — the monitoring worker: command handling, check
//! execution, and result fan-out.
//!
//! A worker consumes command envelopes from the shared queue and turns
//! them into recurring check loops. Each loop runs one service's probe
//! strictly serialized (check, sleep, check), with a semaphore bounding
//! how many probes run at once across loops. Every completed check
//! flows through the [`CheckPipeline`]: status cache, result outbox,
//! metrics, and incident detection, in that order.
//!
//! The [`WorkerRuntime`] ties it together: registration and heartbeats
//! against the registry, queue consumption with poison rejection, and
//! shard-based assignment restore after a restart.

pub mod command;
pub mod pipeline;
pub mod probe;
pub mod restore;
pub mod runtime;
pub mod scheduler;

pub use command::{CommandEnvelope, CommandError, WorkerCommand};
pub use pipeline::{CheckPipeline, CheckStats};
pub use probe::{CheckSpec, ProbeExecutor, ProbeOutcome, StubExecutor};
pub use restore::{assigned_to, shard_for};
pub use runtime::WorkerRuntime;
pub use scheduler::CheckScheduler;
