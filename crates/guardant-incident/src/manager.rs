//! Incident manager — failure state machine over the result stream.
//!
//! Per (nest, service) there is at most one open incident. The first
//! `down` result opens one, further `down` results only refresh its
//! metadata, and the first non-`down` result resolves and clears it so
//! a later failure opens a fresh incident.

use std::sync::Arc;

use tracing::{debug, info};

use guardant_state::{CheckResult, Incident, StateResult, StateStore};

use crate::notify::{IncidentEvent, IncidentNotifier};

pub struct IncidentManager {
    store: StateStore,
    notifier: Arc<dyn IncidentNotifier>,
}

impl IncidentManager {
    pub fn new(store: StateStore, notifier: Arc<dyn IncidentNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Advance the state machine for one check result.
    pub async fn observe(&self, result: &CheckResult) -> StateResult<()> {
        let existing = self.store.get_incident(&result.nest_id, &result.service_id)?;
        match (existing, result.status.is_down()) {
            (None, true) => self.open(result).await?,
            (Some(incident), true) => self.refresh(incident, result)?,
            (Some(incident), false) => self.resolve(incident, result).await?,
            (None, false) => {}
        }
        Ok(())
    }

    /// All currently open incidents.
    pub fn open_incidents(&self) -> StateResult<Vec<Incident>> {
        self.store.list_incidents()
    }

    async fn open(&self, result: &CheckResult) -> StateResult<()> {
        let incident = Incident {
            id: generate_incident_id(&result.nest_id, &result.service_id, result.timestamp),
            service_id: result.service_id.clone(),
            nest_id: result.nest_id.clone(),
            started_at: result.timestamp,
            resolved_at: None,
            reason: failure_reason(result),
        };
        self.store.put_incident(&incident)?;
        info!(
            incident_id = %incident.id,
            service_id = %result.service_id,
            nest_id = %result.nest_id,
            "incident opened"
        );
        self.notifier
            .notify(IncidentEvent::IncidentStarted { incident })
            .await;
        Ok(())
    }

    fn refresh(&self, mut incident: Incident, result: &CheckResult) -> StateResult<()> {
        incident.reason = failure_reason(result);
        self.store.put_incident(&incident)?;
        debug!(
            incident_id = %incident.id,
            service_id = %result.service_id,
            "incident still open"
        );
        Ok(())
    }

    async fn resolve(&self, mut incident: Incident, result: &CheckResult) -> StateResult<()> {
        incident.resolved_at = Some(result.timestamp);
        let duration_ms = result.timestamp.saturating_sub(incident.started_at);
        self.store
            .delete_incident(&result.nest_id, &result.service_id)?;
        info!(
            incident_id = %incident.id,
            service_id = %result.service_id,
            duration_ms,
            "incident resolved"
        );
        self.notifier
            .notify(IncidentEvent::IncidentResolved {
                incident,
                duration_ms,
            })
            .await;
        Ok(())
    }
}

fn failure_reason(result: &CheckResult) -> String {
    result
        .error_message
        .clone()
        .unwrap_or_else(|| format!("check reported {}", result.status.as_str()))
}

/// Deterministic incident ID from the opening check.
fn generate_incident_id(nest_id: &str, service_id: &str, started_at: u64) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    nest_id.hash(&mut hasher);
    service_id.hash(&mut hasher);
    started_at.hash(&mut hasher);
    format!("incident-{:08x}", hasher.finish() as u32)
}
