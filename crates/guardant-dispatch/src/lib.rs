//! guardant-dispatch — the coordinator's scheduling pass.
//!
//! Each tick the [`JobDispatcher`] reads the active service list,
//! routes every service through the routing engine, and reconciles the
//! shared queue with the result: `monitor_service` jobs for new or
//! changed assignments, `stop_monitoring` jobs for retired services
//! and dropped regions, nothing for assignments that stand unchanged.
//! Job keys deduplicate per (service, region), priorities come from
//! the nest's subscription tier, and every job carries a best-worker
//! placement hint.

pub mod dispatcher;
pub mod error;

pub use dispatcher::{JobDispatcher, PassSummary};
pub use error::{DispatchError, DispatchResult};
