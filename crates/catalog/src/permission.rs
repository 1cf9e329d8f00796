use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use permsync_core::{ObjectVersion, PermissionId, ResourceLevel};

/// Permission identity.
///
/// Codes are derived as `"{service}.{resource}.{action}"` (e.g.
/// `"iam-service.user.create"`). The code stays stable across re-syncs as long
/// as none of its three parts changes, so it is the natural upsert key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(Cow<'static, str>);

impl PermissionCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn derive(service_name: &str, resource_code: &str, action: &str) -> Self {
        Self(Cow::Owned(format!("{service_name}.{resource_code}.{action}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A synchronized, callable platform operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub path: String,
    pub method: String,
    pub level: ResourceLevel,
    pub description: String,
    pub action: String,
    pub resource_code: String,
    pub is_public: bool,
    pub requires_login: bool,
    pub is_within_organization: bool,
    pub service_name: String,
    pub object_version_number: ObjectVersion,
}

/// Permission attributes as declared by a service, before the store has
/// assigned an identifier and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDraft {
    pub code: PermissionCode,
    pub path: String,
    pub method: String,
    pub level: ResourceLevel,
    pub description: String,
    pub action: String,
    pub resource_code: String,
    pub is_public: bool,
    pub requires_login: bool,
    pub is_within_organization: bool,
    pub service_name: String,
}

impl PermissionDraft {
    /// Attach storage identity, producing the full record.
    ///
    /// Used both by stores on insert and by the reconciler to build an update
    /// candidate that carries the stored id and version token.
    pub fn into_permission(self, id: PermissionId, version: ObjectVersion) -> Permission {
        Permission {
            id,
            code: self.code,
            path: self.path,
            method: self.method,
            level: self.level,
            description: self.description,
            action: self.action,
            resource_code: self.resource_code,
            is_public: self.is_public,
            requires_login: self.requires_login,
            is_within_organization: self.is_within_organization,
            service_name: self.service_name,
            object_version_number: version,
        }
    }
}
