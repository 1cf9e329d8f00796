use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A service instance announced by the registry.
///
/// This is the trigger for a synchronization run: the instance at
/// `instance_address` publishes the API document the catalog is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEvent {
    #[serde(default = "Uuid::now_v7")]
    pub event_id: Uuid,
    pub service_name: String,
    #[serde(default)]
    pub version: String,
    /// `host:port` of the instance.
    pub instance_address: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl InstanceEvent {
    pub fn new(
        service_name: impl Into<String>,
        version: impl Into<String>,
        instance_address: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            service_name: service_name.into(),
            version: version.into(),
            instance_address: instance_address.into(),
            received_at: Utc::now(),
        }
    }
}

/// Helper trait for messages that concern a single service.
///
/// Workers can be pinned to one service and ignore everything else, which is
/// handy when bootstrapping a single service's catalog.
pub trait ServiceScoped {
    fn service_name(&self) -> &str;
}

impl ServiceScoped for InstanceEvent {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_payload_only_needs_service_and_address() {
        let event: InstanceEvent = serde_json::from_str(
            r#"{"service_name":"iam-service","instance_address":"10.0.0.4:8030"}"#,
        )
        .unwrap();

        assert_eq!(event.service_name(), "iam-service");
        assert_eq!(event.instance_address, "10.0.0.4:8030");
        assert_eq!(event.version, "");
    }
}
