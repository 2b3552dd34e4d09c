//! Geo estimation seam for monitored targets.
//!
//! The `closest` and `failover` strategies want to know roughly where a
//! target sits. That knowledge lives outside this system (GeoIP feeds,
//! CDN hints), so it enters through a trait; when no estimate exists,
//! callers degrade explicitly instead of guessing.

use std::collections::HashMap;

use guardant_state::Coordinates;

/// Estimates where a monitored target is physically located.
pub trait GeoLocator: Send + Sync {
    /// Best-effort location for a target (URL, hostname, address).
    /// None means "no idea", which callers must treat as a degrade, not
    /// an error.
    fn locate(&self, target: &str) -> Option<Coordinates>;
}

/// Locator that never knows anything. The default wiring.
#[derive(Debug, Default)]
pub struct NullLocator;

impl GeoLocator for NullLocator {
    fn locate(&self, _target: &str) -> Option<Coordinates> {
        None
    }
}

/// Fixed target→location table, for tests and static deployments.
#[derive(Debug, Default)]
pub struct TableLocator {
    entries: HashMap<String, Coordinates>,
}

impl TableLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, target: impl Into<String>, location: Coordinates) -> Self {
        self.entries.insert(target.into(), location);
        self
    }
}

impl GeoLocator for TableLocator {
    fn locate(&self, target: &str) -> Option<Coordinates> {
        self.entries.get(target).copied()
    }
}
