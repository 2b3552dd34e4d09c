//! guardant-metrics — check outcome counters and Prometheus rendering.

pub mod collector;
pub mod prometheus;

pub use collector::{CheckMetrics, CheckSample, ServiceCheckSnapshot};
pub use prometheus::render_prometheus;
