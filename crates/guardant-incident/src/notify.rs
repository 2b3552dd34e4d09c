//! Notification seam for incident lifecycle events.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use guardant_state::Incident;

/// Lifecycle event handed to the notification service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum IncidentEvent {
    IncidentStarted {
        incident: Incident,
    },
    #[serde(rename_all = "camelCase")]
    IncidentResolved {
        incident: Incident,
        duration_ms: u64,
    },
}

/// Receives incident lifecycle events. Delivery (email, webhook) lives
/// behind this seam.
#[async_trait]
pub trait IncidentNotifier: Send + Sync {
    async fn notify(&self, event: IncidentEvent);
}

/// Notifier that logs each event. The standalone default.
pub struct LogNotifier;

#[async_trait]
impl IncidentNotifier for LogNotifier {
    async fn notify(&self, event: IncidentEvent) {
        match &event {
            IncidentEvent::IncidentStarted { incident } => warn!(
                incident_id = %incident.id,
                service_id = %incident.service_id,
                nest_id = %incident.nest_id,
                reason = %incident.reason,
                "incident started"
            ),
            IncidentEvent::IncidentResolved {
                incident,
                duration_ms,
            } => info!(
                incident_id = %incident.id,
                service_id = %incident.service_id,
                nest_id = %incident.nest_id,
                duration_ms,
                "incident resolved"
            ),
        }
    }
}
