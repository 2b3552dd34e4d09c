//! Region catalog — the static set of monitoring points of presence.
//!
//! Regions are deployment-time configuration, not runtime state: workers
//! come and go, the catalog does not. Availability is derived by joining
//! catalog entries against live workers in the registry.

use serde::Serialize;

use guardant_state::{Coordinates, MonitoringRegion, RegionId, StateResult};

use crate::registry::WorkerRegistry;

/// A catalog entry annotated with whether any live worker serves it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionAvailability {
    #[serde(flatten)]
    pub region: MonitoringRegion,
    pub available: bool,
}

/// The set of regions checks may be routed to.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    regions: Vec<MonitoringRegion>,
}

impl RegionCatalog {
    pub fn new(regions: Vec<MonitoringRegion>) -> Self {
        Self { regions }
    }

    /// The built-in points of presence.
    pub fn default_pops() -> Self {
        Self::new(vec![
            region("eu-west-1", "EU West (Dublin)", "Europe", "IE", "Dublin", 53.3498, -6.2603),
            region(
                "eu-central-1",
                "EU Central (Frankfurt)",
                "Europe",
                "DE",
                "Frankfurt",
                50.1109,
                8.6821,
            ),
            region(
                "us-east-1",
                "US East (Ashburn)",
                "North America",
                "US",
                "Ashburn",
                39.0438,
                -77.4874,
            ),
            region(
                "us-west-1",
                "US West (San Francisco)",
                "North America",
                "US",
                "San Francisco",
                37.7749,
                -122.4194,
            ),
            region(
                "ap-southeast-1",
                "Asia Pacific (Singapore)",
                "Asia",
                "SG",
                "Singapore",
                1.3521,
                103.8198,
            ),
            region(
                "ap-northeast-1",
                "Asia Pacific (Tokyo)",
                "Asia",
                "JP",
                "Tokyo",
                35.6762,
                139.6503,
            ),
            region(
                "sa-east-1",
                "South America (Sao Paulo)",
                "South America",
                "BR",
                "Sao Paulo",
                -23.5505,
                -46.6333,
            ),
        ])
    }

    /// Look up a region by id.
    pub fn get(&self, id: &str) -> Option<&MonitoringRegion> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn regions(&self) -> &[MonitoringRegion] {
        &self.regions
    }

    /// Annotate every catalog entry with live-worker availability.
    pub fn availability(
        &self,
        registry: &WorkerRegistry,
        now_ms: u64,
    ) -> StateResult<Vec<RegionAvailability>> {
        let live = registry.available_regions(now_ms)?;
        Ok(self
            .regions
            .iter()
            .map(|r| RegionAvailability {
                region: r.clone(),
                available: live.contains(&r.id),
            })
            .collect())
    }

    /// Ids of catalog regions with at least one live worker, sorted
    /// lexicographically. This is the deterministic backfill pool for
    /// region selection.
    pub fn available_ids(
        &self,
        registry: &WorkerRegistry,
        now_ms: u64,
    ) -> StateResult<Vec<RegionId>> {
        let live = registry.available_regions(now_ms)?;
        let mut ids: Vec<RegionId> = self
            .regions
            .iter()
            .filter(|r| live.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl Default for RegionCatalog {
    fn default() -> Self {
        Self::default_pops()
    }
}

fn region(
    id: &str,
    name: &str,
    continent: &str,
    country: &str,
    city: &str,
    lat: f64,
    lon: f64,
) -> MonitoringRegion {
    MonitoringRegion {
        id: id.to_string(),
        name: name.to_string(),
        continent: continent.to_string(),
        country: country.to_string(),
        city: city.to_string(),
        coordinates: Coordinates { lat, lon },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_spans_four_continents() {
        let catalog = RegionCatalog::default_pops();
        assert_eq!(catalog.regions().len(), 7);

        let mut continents: Vec<&str> =
            catalog.regions().iter().map(|r| r.continent.as_str()).collect();
        continents.sort();
        continents.dedup();
        assert_eq!(continents, ["Asia", "Europe", "North America", "South America"]);
    }

    #[test]
    fn lookup_by_id() {
        let catalog = RegionCatalog::default_pops();
        assert!(catalog.contains("eu-west-1"));
        assert_eq!(catalog.get("eu-west-1").unwrap().city, "Dublin");
        assert!(!catalog.contains("mars-north-1"));
    }

    #[test]
    fn availability_serializes_flat() {
        let entry = RegionAvailability {
            region: RegionCatalog::default_pops().get("eu-west-1").unwrap().clone(),
            available: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "eu-west-1");
        assert_eq!(json["available"], true);
    }
}
