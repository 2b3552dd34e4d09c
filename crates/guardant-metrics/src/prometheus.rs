//! Prometheus text exposition format.
//!
//! Renders check-metric snapshots into the Prometheus text exposition
//! format for scraping by a Prometheus server or compatible agent.

use crate::collector::ServiceCheckSnapshot;

use guardant_state::CheckStatus;

/// Render check snapshots into Prometheus text format.
///
/// Produces COUNTER, SUMMARY and GAUGE metrics with `nest`, `service`
/// and (where meaningful) `status` labels.
pub fn render_prometheus(snapshots: &[ServiceCheckSnapshot]) -> String {
    let mut out = String::new();

    out.push_str("# HELP guardant_checks_total Completed checks by outcome.\n");
    out.push_str("# TYPE guardant_checks_total counter\n");
    for s in snapshots {
        for (status, count) in [
            ("up", s.up),
            ("down", s.down),
            ("degraded", s.degraded),
            ("error", s.error),
        ] {
            out.push_str(&format!(
                "guardant_checks_total{{nest=\"{}\",service=\"{}\",type=\"{}\",status=\"{}\"}} {}\n",
                s.nest_id,
                s.service_id,
                s.service_type.as_str(),
                status,
                count
            ));
        }
    }

    out.push_str("# HELP guardant_check_duration_seconds Probe durations.\n");
    out.push_str("# TYPE guardant_check_duration_seconds summary\n");
    for s in snapshots {
        out.push_str(&format!(
            "guardant_check_duration_seconds_sum{{nest=\"{}\",service=\"{}\"}} {:.6}\n",
            s.nest_id, s.service_id, s.duration_seconds_sum
        ));
        out.push_str(&format!(
            "guardant_check_duration_seconds_count{{nest=\"{}\",service=\"{}\"}} {}\n",
            s.nest_id, s.service_id, s.samples
        ));
    }

    out.push_str("# HELP guardant_service_up Whether the last check found the service up.\n");
    out.push_str("# TYPE guardant_service_up gauge\n");
    for s in snapshots {
        let up = if s.last_status == CheckStatus::Up { 1 } else { 0 };
        out.push_str(&format!(
            "guardant_service_up{{nest=\"{}\",service=\"{}\",region=\"{}\"}} {}\n",
            s.nest_id, s.service_id, s.last_region, up
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardant_state::ServiceType;

    fn test_snapshot(service_id: &str) -> ServiceCheckSnapshot {
        ServiceCheckSnapshot {
            nest_id: "nest-1".to_string(),
            service_id: service_id.to_string(),
            service_type: ServiceType::Web,
            up: 12,
            down: 2,
            degraded: 1,
            error: 0,
            duration_seconds_sum: 4.5,
            samples: 15,
            last_status: CheckStatus::Up,
            last_region: "eu-west-1".to_string(),
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&[]);
        // Should still have type declarations.
        assert!(output.contains("# HELP guardant_checks_total"));
        assert!(output.contains("# TYPE guardant_checks_total counter"));
    }

    #[test]
    fn render_single_service() {
        let output = render_prometheus(&[test_snapshot("my-api")]);

        assert!(output.contains(
            "guardant_checks_total{nest=\"nest-1\",service=\"my-api\",type=\"web\",status=\"up\"} 12"
        ));
        assert!(output.contains(
            "guardant_checks_total{nest=\"nest-1\",service=\"my-api\",type=\"web\",status=\"down\"} 2"
        ));
        assert!(output.contains(
            "guardant_check_duration_seconds_sum{nest=\"nest-1\",service=\"my-api\"} 4.500000"
        ));
        assert!(output.contains(
            "guardant_check_duration_seconds_count{nest=\"nest-1\",service=\"my-api\"} 15"
        ));
        assert!(output.contains(
            "guardant_service_up{nest=\"nest-1\",service=\"my-api\",region=\"eu-west-1\"} 1"
        ));
    }

    #[test]
    fn down_service_renders_zero_gauge() {
        let mut snap = test_snapshot("my-api");
        snap.last_status = CheckStatus::Down;
        let output = render_prometheus(&[snap]);
        assert!(output.contains(
            "guardant_service_up{nest=\"nest-1\",service=\"my-api\",region=\"eu-west-1\"} 0"
        ));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&[test_snapshot("svc")]);

        // Every non-empty, non-comment line should match: metric_name{labels} value
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }
}
