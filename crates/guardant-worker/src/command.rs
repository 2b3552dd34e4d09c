//! Worker command protocol.
//!
//! Commands travel over the job queue as JSON envelopes:
//!
//! ```json
//! { "command": "monitor_service", "data": { ... }, "timestamp": 1700000000000 }
//! ```
//!
//! The three command kinds are an exhaustive sum type; anything that
//! does not parse or validate is poison and is rejected without
//! redelivery.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use guardant_state::{NestId, RegionId, ServiceId, ServiceType};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid command: {0}")]
    Invalid(String),
}

/// One instruction to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// (Re)establish the recurring check loop for a service.
    #[serde(rename_all = "camelCase")]
    MonitorService {
        service_id: ServiceId,
        nest_id: NestId,
        #[serde(rename = "type")]
        service_type: ServiceType,
        target: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        config: serde_json::Value,
        regions: Vec<RegionId>,
        /// Seconds between checks.
        interval: u64,
    },

    /// Cancel the check loop for a service.
    #[serde(rename_all = "camelCase")]
    StopMonitoring { service_id: ServiceId },

    /// Run exactly one check, tagged so the requester can correlate
    /// the result.
    #[serde(rename_all = "camelCase")]
    CheckServiceOnce {
        service_id: ServiceId,
        nest_id: NestId,
        #[serde(rename = "type")]
        service_type: ServiceType,
        target: String,
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        config: serde_json::Value,
        regions: Vec<RegionId>,
        cache_key: String,
    },
}

impl WorkerCommand {
    /// The service this command concerns, for logging.
    pub fn service_id(&self) -> &str {
        match self {
            WorkerCommand::MonitorService { service_id, .. }
            | WorkerCommand::StopMonitoring { service_id }
            | WorkerCommand::CheckServiceOnce { service_id, .. } => service_id,
        }
    }

    fn validate(&self) -> Result<(), CommandError> {
        if self.service_id().is_empty() {
            return Err(CommandError::Invalid("empty serviceId".to_string()));
        }
        if let WorkerCommand::MonitorService { interval, .. } = self
            && *interval == 0
        {
            return Err(CommandError::Invalid(
                "monitor_service interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A command plus the coordinator-side timestamp it was issued at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    #[serde(flatten)]
    pub command: WorkerCommand,
    pub timestamp: u64,
}

impl CommandEnvelope {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            timestamp: epoch_ms(),
        }
    }

    /// Serialize for use as a queue payload.
    pub fn to_payload(&self) -> Result<serde_json::Value, CommandError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse and validate a queue payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, CommandError> {
        let envelope: Self = serde_json::from_value(payload.clone())?;
        envelope.command.validate()?;
        Ok(envelope)
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitor_command() -> WorkerCommand {
        WorkerCommand::MonitorService {
            service_id: "svc-1".to_string(),
            nest_id: "nest-1".to_string(),
            service_type: ServiceType::Web,
            target: "https://example.com".to_string(),
            config: json!({"expectedStatus": 200}),
            regions: vec!["eu-west-1".to_string()],
            interval: 60,
        }
    }

    #[test]
    fn monitor_service_wire_shape() {
        let envelope = CommandEnvelope {
            command: monitor_command(),
            timestamp: 1_700_000_000_000,
        };
        let value = envelope.to_payload().unwrap();

        assert_eq!(value["command"], "monitor_service");
        assert_eq!(value["timestamp"], 1_700_000_000_000u64);
        assert_eq!(value["data"]["serviceId"], "svc-1");
        assert_eq!(value["data"]["nestId"], "nest-1");
        assert_eq!(value["data"]["type"], "web");
        assert_eq!(value["data"]["target"], "https://example.com");
        assert_eq!(value["data"]["interval"], 60);
        assert_eq!(value["data"]["regions"][0], "eu-west-1");
    }

    #[test]
    fn stop_monitoring_wire_shape() {
        let envelope = CommandEnvelope {
            command: WorkerCommand::StopMonitoring {
                service_id: "svc-1".to_string(),
            },
            timestamp: 1,
        };
        let value = envelope.to_payload().unwrap();

        assert_eq!(value["command"], "stop_monitoring");
        assert_eq!(value["data"], json!({"serviceId": "svc-1"}));
    }

    #[test]
    fn check_once_wire_shape() {
        let envelope = CommandEnvelope {
            command: WorkerCommand::CheckServiceOnce {
                service_id: "svc-1".to_string(),
                nest_id: "nest-1".to_string(),
                service_type: ServiceType::Tcp,
                target: "db.example.com:5432".to_string(),
                config: serde_json::Value::Null,
                regions: vec!["us-east-1".to_string()],
                cache_key: "adhoc-42".to_string(),
            },
            timestamp: 1,
        };
        let value = envelope.to_payload().unwrap();

        assert_eq!(value["command"], "check_service_once");
        assert_eq!(value["data"]["cacheKey"], "adhoc-42");
        assert_eq!(value["data"]["type"], "tcp");
        // Null config stays off the wire.
        assert!(value["data"].get("config").is_none());
    }

    #[test]
    fn round_trip_preserves_command() {
        let envelope = CommandEnvelope::new(monitor_command());
        let payload = envelope.to_payload().unwrap();
        let parsed = CommandEnvelope::from_payload(&payload).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn unknown_command_is_malformed() {
        let payload = json!({
            "command": "reboot_worker",
            "data": {},
            "timestamp": 1
        });
        let err = CommandEnvelope::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
    }

    #[test]
    fn missing_data_is_malformed() {
        let payload = json!({"command": "stop_monitoring", "timestamp": 1});
        let err = CommandEnvelope::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let payload = json!({
            "command": "monitor_service",
            "data": {
                "serviceId": "svc-1",
                "nestId": "nest-1",
                "type": "web",
                "target": "https://example.com",
                "regions": [],
                "interval": 0
            },
            "timestamp": 1
        });
        let err = CommandEnvelope::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CommandError::Invalid(_)));
    }

    #[test]
    fn empty_service_id_is_invalid() {
        let payload = json!({
            "command": "stop_monitoring",
            "data": {"serviceId": ""},
            "timestamp": 1
        });
        let err = CommandEnvelope::from_payload(&payload).unwrap_err();
        assert!(matches!(err, CommandError::Invalid(_)));
    }

    #[test]
    fn absent_config_defaults_to_null() {
        let payload = json!({
            "command": "monitor_service",
            "data": {
                "serviceId": "svc-1",
                "nestId": "nest-1",
                "type": "ping",
                "target": "example.com",
                "regions": ["eu-west-1"],
                "interval": 30
            },
            "timestamp": 1
        });
        let envelope = CommandEnvelope::from_payload(&payload).unwrap();
        match envelope.command {
            WorkerCommand::MonitorService { config, .. } => {
                assert!(config.is_null());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
