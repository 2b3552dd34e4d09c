//! guardant-routing — region selection for monitored services.
//!
//! Implements the four routing strategies (`all-selected`, `closest`,
//! `round-robin`, `failover`) over the region catalog and live worker
//! registry, with min/max clamping and deterministic backfill. Geo
//! knowledge enters through the [`GeoLocator`] seam; without it the
//! distance-based strategies degrade explicitly.

pub mod engine;
pub mod error;
pub mod geo;

pub use engine::RoutingEngine;
pub use error::{RoutingError, RoutingResult};
pub use geo::{GeoLocator, NullLocator, TableLocator};
