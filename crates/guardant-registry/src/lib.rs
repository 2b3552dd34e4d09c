//! guardant-registry — region catalog and worker fleet tracking.
//!
//! Two cooperating pieces:
//!
//! - [`RegionCatalog`]: the static set of monitoring points of presence,
//!   annotated with live-worker availability on demand.
//! - [`WorkerRegistry`]: TTL-leased worker records with heartbeat refresh,
//!   a strict liveness window for routing, and scored placement lookups.
//!
//! All reads take an explicit `now_ms` so liveness and availability stay
//! pure functions of time, which keeps the routing layer above this crate
//! deterministic and testable.

pub mod catalog;
pub mod registry;
pub mod score;

pub use catalog::{RegionAvailability, RegionCatalog};
pub use registry::{
    HEARTBEAT_INTERVAL_MS, LIVENESS_WINDOW_MS, WORKER_TTL_MS, WorkerRegistry,
};
pub use score::{ScoreBreakdown, WorkerRequirements, WorkerScore, rank_workers, score_worker};
