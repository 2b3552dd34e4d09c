//! guardant.toml configuration parser.

use guardant_state::{MonitoringPolicy, RoutingStrategy, ServiceDefinition, ServiceType, SubscriptionTier};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuardantConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub outbox: OutboxSection,
    /// Nest id to subscription tier, for job prioritisation.
    #[serde(default)]
    pub tiers: HashMap<String, SubscriptionTier>,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub api_port: u16,
    pub data_dir: PathBuf,
    /// Seconds between dispatch passes.
    pub tick_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            api_port: 8070,
            data_dir: PathBuf::from("/var/lib/guardant"),
            tick_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Region the embedded workers report from.
    pub region: String,
    /// Number of worker replicas to run in-process.
    pub replicas: u32,
    pub max_concurrency: u32,
    /// Start check loops from the service list before the first
    /// dispatch pass, instead of waiting for queued commands.
    pub restore_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            replicas: 1,
            max_concurrency: 10,
            restore_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxSection {
    pub max_cache_size: usize,
    pub flush_interval_secs: u64,
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self {
            max_cache_size: 1000,
            flush_interval_secs: 60,
        }
    }
}

/// One `[[service]]` block: a monitored service plus its routing policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    pub id: String,
    pub nest_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub target: String,
    /// Probe configuration, passed through to the executor untouched.
    #[serde(default)]
    pub config: Option<toml::Value>,
    /// Seconds between checks.
    pub interval: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub strategy: RoutingStrategy,
    #[serde(default)]
    pub min_regions: Option<u32>,
    #[serde(default)]
    pub max_regions: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl ServiceEntry {
    pub fn to_definition(&self) -> ServiceDefinition {
        let config = self
            .config
            .as_ref()
            .and_then(|value| serde_json::to_value(value).ok())
            .unwrap_or(serde_json::Value::Null);
        ServiceDefinition {
            id: self.id.clone(),
            nest_id: self.nest_id.clone(),
            name: self.name.clone(),
            service_type: self.service_type,
            target: self.target.clone(),
            config,
            interval: self.interval,
            enabled: self.enabled,
            monitoring: MonitoringPolicy {
                regions: self.regions.clone(),
                strategy: self.strategy,
                min_regions: self.min_regions,
                max_regions: self.max_regions,
            },
        }
    }
}

impl GuardantConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GuardantConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
