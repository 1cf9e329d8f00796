//! Decoding of the permission metadata embedded in an operation's description.
//!
//! Services serialize an envelope such as
//!
//! ```text
//! {"permission":{"action":"create","permissionLevel":"site","permissionPublic":false,
//!   "permissionLogin":false,"permissionWithin":false,"roles":["role/site/default/developer"]}}
//! ```
//!
//! into the `description` string of each operation. Decoding never fails the
//! run: the outcome is a [`MetadataDecode`] that the caller branches on.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use permsync_core::ResourceLevel;

use crate::extract::EndpointDeclaration;
use crate::permission::{PermissionCode, PermissionDraft};
use crate::role::RoleCode;

/// Permission metadata declared for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDeclaration {
    pub action: String,
    pub level: ResourceLevel,
    pub is_public: bool,
    pub requires_login: bool,
    pub is_within_organization: bool,
    /// Roles that should hold the permission in addition to the administrator
    /// role of its level. `None` when the service declared nothing.
    pub roles: Option<Vec<RoleCode>>,
}

impl PermissionDeclaration {
    /// Explicit role codes, empty when none were declared.
    pub fn role_codes(&self) -> &[RoleCode] {
        self.roles.as_deref().unwrap_or_default()
    }

    /// Build the permission record this declaration describes.
    pub fn to_draft(&self, service_name: &str, endpoint: &EndpointDeclaration) -> PermissionDraft {
        PermissionDraft {
            code: PermissionCode::derive(service_name, &endpoint.resource_code, &self.action),
            path: endpoint.path.clone(),
            method: endpoint.method.clone(),
            level: self.level,
            description: endpoint.summary.clone(),
            action: self.action.clone(),
            resource_code: endpoint.resource_code.clone(),
            is_public: self.is_public,
            requires_login: self.requires_login,
            is_within_organization: self.is_within_organization,
            service_name: service_name.to_string(),
        }
    }
}

/// Outcome of decoding one endpoint's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataDecode {
    Declared(PermissionDeclaration),
    /// Nothing to decode, or an envelope without a permission section.
    Absent,
    /// Present but unusable.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    #[serde(default)]
    permission: Option<RawPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPermission {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    permission_level: Option<String>,
    #[serde(default)]
    permission_public: bool,
    #[serde(default)]
    permission_login: bool,
    #[serde(default)]
    permission_within: bool,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

/// Decode the `description` node of an operation.
pub fn decode_metadata(description: Option<&JsonValue>) -> MetadataDecode {
    let raw = match description {
        None | Some(JsonValue::Null) => return MetadataDecode::Absent,
        Some(JsonValue::String(raw)) => raw,
        Some(other) => {
            return MetadataDecode::Malformed(format!(
                "description is not a string: {other}"
            ));
        }
    };

    let envelope: MetadataEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => return MetadataDecode::Malformed(format!("extra data read failed: {e}")),
    };

    let Some(permission) = envelope.permission else {
        return MetadataDecode::Absent;
    };

    let action = match permission.action {
        Some(action) if !action.trim().is_empty() => action,
        _ => return MetadataDecode::Malformed("permission has no action".to_string()),
    };

    let level = match permission.permission_level.as_deref().map(str::parse::<ResourceLevel>) {
        Some(Ok(level)) => level,
        Some(Err(e)) => return MetadataDecode::Malformed(e.to_string()),
        None => {
            return MetadataDecode::Malformed("permission has no permissionLevel".to_string());
        }
    };

    MetadataDecode::Declared(PermissionDeclaration {
        action,
        level,
        is_public: permission.permission_public,
        requires_login: permission.permission_login,
        is_within_organization: permission.permission_within,
        roles: permission
            .roles
            .map(|roles| roles.into_iter().map(RoleCode::new).collect()),
    })
}
