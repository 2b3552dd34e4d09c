//! Service directory — seam to the tenant/service catalog.
//!
//! GuardAnt does not own service or tenant records; an external control
//! plane does. The scheduler only needs two questions answered: which
//! services are eligible for monitoring, and what tier a nest pays for.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{NestId, ServiceDefinition, ServiceId, SubscriptionTier};

/// Read access to the external service/tenant catalog.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Service definitions eligible for scheduling. Disabled services
    /// must not be returned.
    async fn active_services(&self) -> anyhow::Result<Vec<ServiceDefinition>>;

    /// Subscription tier for a nest; `Unknown` when the nest is unmapped.
    async fn subscription_tier(&self, nest_id: &str) -> SubscriptionTier;
}

/// In-memory `ServiceStore` for standalone mode and tests.
#[derive(Default)]
pub struct StaticServiceStore {
    services: RwLock<Vec<ServiceDefinition>>,
    tiers: RwLock<HashMap<NestId, SubscriptionTier>>,
}

impl StaticServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service definition (matched by id).
    pub async fn upsert(&self, service: ServiceDefinition) {
        let mut services = self.services.write().await;
        if let Some(existing) = services.iter_mut().find(|s| s.id == service.id) {
            *existing = service;
        } else {
            services.push(service);
        }
    }

    /// Remove a service definition. Returns true if it existed.
    pub async fn remove(&self, service_id: &ServiceId) -> bool {
        let mut services = self.services.write().await;
        let before = services.len();
        services.retain(|s| &s.id != service_id);
        services.len() != before
    }

    pub async fn set_tier(&self, nest_id: impl Into<NestId>, tier: SubscriptionTier) {
        self.tiers.write().await.insert(nest_id.into(), tier);
    }
}

#[async_trait]
impl ServiceStore for StaticServiceStore {
    async fn active_services(&self) -> anyhow::Result<Vec<ServiceDefinition>> {
        let services = self.services.read().await;
        Ok(services.iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn subscription_tier(&self, nest_id: &str) -> SubscriptionTier {
        self.tiers
            .read()
            .await
            .get(nest_id)
            .copied()
            .unwrap_or_default()
    }
}
