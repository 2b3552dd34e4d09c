//! Worker scoring for check placement.
//!
//! Evaluates live candidate workers using an additive combination of:
//! - **Proximity**: closer to the monitored target is better
//! - **Capacity**: headroom from the worker's concurrency limit
//! - **Reliability**: penalize workers with a history of failed checks
//! - **Tags**: bonus per requested capability tag the worker carries
//!
//! Infeasible workers (wrong region, missing check type) are rejected
//! outright rather than scored low.

use guardant_state::{Coordinates, RegionId, ServiceType, WorkerId, WorkerNode};

/// What a check placement needs from a worker.
#[derive(Debug, Clone)]
pub struct WorkerRequirements {
    /// Check type the worker must support.
    pub service_type: ServiceType,
    /// Restrict candidates to one region, if set.
    pub region: Option<RegionId>,
    /// Estimated location of the monitored target, when known.
    pub target_location: Option<Coordinates>,
    /// Tags that add score when the worker carries them.
    pub tags: Vec<String>,
}

/// Scored placement result for a single worker.
#[derive(Debug, Clone)]
pub struct WorkerScore {
    pub worker_id: WorkerId,
    /// Total composite score (higher = better).
    pub score: f64,
    /// Checks currently running on the worker; breaks score ties, lowest first.
    pub active_checks: u32,
    /// Breakdown of score components.
    pub breakdown: ScoreBreakdown,
}

/// Individual score components for debugging.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub proximity: f64,
    pub capacity: f64,
    pub reliability: f64,
    pub tag_bonus: f64,
}

/// Score a single worker for the given requirements.
///
/// Returns None for infeasible workers. Liveness is the caller's
/// concern; only live candidates should reach this function.
pub fn score_worker(node: &WorkerNode, req: &WorkerRequirements) -> Option<WorkerScore> {
    if req.region.as_ref().is_some_and(|r| r != &node.region) {
        return None;
    }

    if !node.capabilities.service_types.contains(&req.service_type) {
        return None;
    }

    // Proximity decays with distance; unknown target location scores
    // neutral so capacity and reliability decide.
    let proximity = match &req.target_location {
        Some(target) => {
            let distance_km = node.location.coordinates.haversine_km(target);
            (100.0 - distance_km / 100.0).max(0.0)
        }
        None => 0.0,
    };

    let capacity = f64::from(node.capabilities.limits.max_concurrency);
    let reliability = (1.0 - node.failure_rate()) * 100.0;

    let matched = req.tags.iter().filter(|t| node.tags.contains(t)).count();
    let tag_bonus = 10.0 * matched as f64;

    Some(WorkerScore {
        worker_id: node.id.clone(),
        score: proximity + capacity + reliability + tag_bonus,
        active_checks: node.status.active_checks,
        breakdown: ScoreBreakdown { proximity, capacity, reliability, tag_bonus },
    })
}

/// Score all candidates and return a sorted list (best first).
///
/// Ties on score go to the worker with fewer active checks; remaining
/// ties fall back to worker id so ranking is deterministic.
pub fn rank_workers(nodes: &[WorkerNode], req: &WorkerRequirements) -> Vec<WorkerScore> {
    let mut scores: Vec<WorkerScore> =
        nodes.iter().filter_map(|n| score_worker(n, req)).collect();

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.active_checks.cmp(&b.active_checks))
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardant_state::*;

    fn make_worker(id: &str, region: &str, lat: f64, lon: f64) -> WorkerNode {
        WorkerNode {
            id: id.to_string(),
            name: id.to_string(),
            version: "0.1.0".to_string(),
            region: region.to_string(),
            location: GeoLocation {
                continent: "Europe".to_string(),
                country: "DE".to_string(),
                city: "Frankfurt".to_string(),
                coordinates: Coordinates { lat, lon },
            },
            capabilities: WorkerCapabilities {
                service_types: vec![ServiceType::Web, ServiceType::Tcp],
                limits: WorkerLimits { max_concurrency: 10 },
            },
            network: NetworkInfo::default(),
            status: WorkerStatus {
                started_at: 0,
                last_heartbeat: 0,
                checks_completed: 100,
                checks_failed: 0,
                active_checks: 0,
            },
            tags: Vec::new(),
        }
    }

    fn web_req() -> WorkerRequirements {
        WorkerRequirements {
            service_type: ServiceType::Web,
            region: None,
            target_location: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn rejects_wrong_region() {
        let node = make_worker("w1", "eu-west-1", 53.3, -6.2);
        let mut req = web_req();
        req.region = Some("us-east-1".to_string());
        assert!(score_worker(&node, &req).is_none());
    }

    #[test]
    fn rejects_unsupported_check_type() {
        let node = make_worker("w1", "eu-west-1", 53.3, -6.2);
        let mut req = web_req();
        req.service_type = ServiceType::Ping;
        assert!(score_worker(&node, &req).is_none());
    }

    #[test]
    fn closer_worker_scores_higher() {
        // Target in Frankfurt; one worker local, one in Tokyo.
        let frankfurt = make_worker("w1", "eu-central-1", 50.1109, 8.6821);
        let tokyo = make_worker("w2", "ap-northeast-1", 35.6762, 139.6503);
        let mut req = web_req();
        req.target_location = Some(Coordinates { lat: 50.1109, lon: 8.6821 });

        let s1 = score_worker(&frankfurt, &req).unwrap();
        let s2 = score_worker(&tokyo, &req).unwrap();
        assert!(s1.score > s2.score);
        assert!(s1.breakdown.proximity > s2.breakdown.proximity);
        // Tokyo is ~9300 km out, past the proximity falloff.
        assert_eq!(s2.breakdown.proximity, 0.0);
    }

    #[test]
    fn failure_history_lowers_score() {
        let reliable = make_worker("w1", "eu-west-1", 53.3, -6.2);
        let mut flaky = make_worker("w2", "eu-west-1", 53.3, -6.2);
        flaky.status.checks_failed = 50;

        let req = web_req();
        let s1 = score_worker(&reliable, &req).unwrap();
        let s2 = score_worker(&flaky, &req).unwrap();
        assert!(s1.score > s2.score);
        assert!((s2.breakdown.reliability - 50.0).abs() < 1e-9);
    }

    #[test]
    fn matching_tags_add_bonus() {
        let mut tagged = make_worker("w1", "eu-west-1", 53.3, -6.2);
        tagged.tags = vec!["ipv6".to_string(), "residential".to_string()];
        let plain = make_worker("w2", "eu-west-1", 53.3, -6.2);

        let mut req = web_req();
        req.tags = vec!["ipv6".to_string()];

        let s1 = score_worker(&tagged, &req).unwrap();
        let s2 = score_worker(&plain, &req).unwrap();
        assert!((s1.score - s2.score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rank_breaks_ties_by_active_checks() {
        let mut busy = make_worker("w1", "eu-west-1", 53.3, -6.2);
        busy.status.active_checks = 8;
        let idle = make_worker("w2", "eu-west-1", 53.3, -6.2);

        let ranked = rank_workers(&[busy, idle], &web_req());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].worker_id, "w2");
    }

    #[test]
    fn rank_is_deterministic_on_full_tie() {
        let a = make_worker("w-a", "eu-west-1", 53.3, -6.2);
        let b = make_worker("w-b", "eu-west-1", 53.3, -6.2);

        let ranked = rank_workers(&[b, a], &web_req());
        assert_eq!(ranked[0].worker_id, "w-a");
    }

    #[test]
    fn rank_skips_infeasible_workers() {
        let mut ping_only = make_worker("w1", "eu-west-1", 53.3, -6.2);
        ping_only.capabilities.service_types = vec![ServiceType::Ping];
        let web = make_worker("w2", "eu-west-1", 53.3, -6.2);

        let ranked = rank_workers(&[ping_only, web], &web_req());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].worker_id, "w2");
    }
}
