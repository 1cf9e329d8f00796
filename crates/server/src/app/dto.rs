//! Request DTOs and mapping to engine types.

use serde::Deserialize;

use permsync_events::InstanceEvent;

/// Instance announcement as posted by a registry or an operator.
///
/// Accepts both snake_case and the registry's camelCase field names.
#[derive(Debug, Deserialize)]
pub struct InstanceUpRequest {
    #[serde(alias = "serviceName")]
    pub service_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(alias = "instanceAddress")]
    pub instance_address: String,
}

impl From<InstanceUpRequest> for InstanceEvent {
    fn from(req: InstanceUpRequest) -> Self {
        InstanceEvent::new(req.service_name, req.version, req.instance_address)
    }
}
