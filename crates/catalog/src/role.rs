use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use permsync_core::{PermissionId, ResourceLevel, RoleId};

/// Well-known codes of the platform-provisioned roles.
pub mod init_role {
    pub const SITE_ADMINISTRATOR: &str = "role/site/default/administrator";
    pub const SITE_DEVELOPER: &str = "role/site/default/developer";
    pub const ORGANIZATION_ADMINISTRATOR: &str = "role/organization/default/administrator";
    pub const ORGANIZATION_MEMBER: &str = "role/organization/default/organization-member";
    pub const PROJECT_ADMINISTRATOR: &str = "role/project/default/administrator";
    pub const PROJECT_MEMBER: &str = "role/project/default/project-member";
    pub const DEPLOY_ADMINISTRATOR: &str = "role/project/default/deploy-administrator";

    pub const ADMINISTRATORS: [&str; 3] = [
        SITE_ADMINISTRATOR,
        ORGANIZATION_ADMINISTRATOR,
        PROJECT_ADMINISTRATOR,
    ];

    pub const ALL: [&str; 7] = [
        SITE_ADMINISTRATOR,
        SITE_DEVELOPER,
        ORGANIZATION_ADMINISTRATOR,
        ORGANIZATION_MEMBER,
        PROJECT_ADMINISTRATOR,
        PROJECT_MEMBER,
        DEPLOY_ADMINISTRATOR,
    ];
}

/// Role code (e.g. `"role/site/default/administrator"`).
///
/// Codes are opaque strings at this layer; roles themselves are provisioned
/// outside the sync engine, which only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCode(Cow<'static, str>);

impl RoleCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, leveled principal group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub code: RoleCode,
    pub level: ResourceLevel,
}

impl Role {
    pub fn new(id: RoleId, code: impl Into<Cow<'static, str>>, level: ResourceLevel) -> Self {
        Self {
            id,
            code: RoleCode::new(code),
            level,
        }
    }
}

/// Association of one role with one permission (at most one per pair).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}

impl RolePermission {
    pub fn new(role_id: RoleId, permission_id: PermissionId) -> Self {
        Self {
            role_id,
            permission_id,
        }
    }
}

/// The bounded universe of platform-provisioned roles.
///
/// Role reconciliation only ever removes links to roles in this set; roles
/// created later by tenants are never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredefinedRoles {
    codes: BTreeSet<RoleCode>,
}

impl PredefinedRoles {
    /// Build a universe from explicit codes. Administrator codes are always
    /// included, whatever the caller passes.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        let mut set: BTreeSet<RoleCode> = codes.into_iter().map(RoleCode::new).collect();
        set.extend(init_role::ADMINISTRATORS.iter().map(|c| RoleCode::new(*c)));
        Self { codes: set }
    }

    pub fn contains(&self, code: &RoleCode) -> bool {
        self.codes.contains(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleCode> {
        self.codes.iter()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Administrator role code for a level.
    pub fn administrator_for(level: ResourceLevel) -> RoleCode {
        RoleCode::new(match level {
            ResourceLevel::Site => init_role::SITE_ADMINISTRATOR,
            ResourceLevel::Organization => init_role::ORGANIZATION_ADMINISTRATOR,
            ResourceLevel::Project => init_role::PROJECT_ADMINISTRATOR,
        })
    }

    pub fn is_administrator(code: &RoleCode) -> bool {
        init_role::ADMINISTRATORS.contains(&code.as_str())
    }
}

impl Default for PredefinedRoles {
    fn default() -> Self {
        Self::new(init_role::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_for_each_level() {
        assert_eq!(
            PredefinedRoles::administrator_for(ResourceLevel::Site).as_str(),
            init_role::SITE_ADMINISTRATOR
        );
        assert_eq!(
            PredefinedRoles::administrator_for(ResourceLevel::Organization).as_str(),
            init_role::ORGANIZATION_ADMINISTRATOR
        );
        assert_eq!(
            PredefinedRoles::administrator_for(ResourceLevel::Project).as_str(),
            init_role::PROJECT_ADMINISTRATOR
        );
    }

    #[test]
    fn universe_always_contains_administrators() {
        let universe = PredefinedRoles::new(["role/project/default/tester"]);
        assert_eq!(universe.len(), 4);
        for code in init_role::ADMINISTRATORS {
            assert!(universe.contains(&RoleCode::new(code)));
        }
        assert!(!universe.contains(&RoleCode::new(init_role::PROJECT_MEMBER)));
    }

    #[test]
    fn default_universe_is_the_builtin_list() {
        let universe = PredefinedRoles::default();
        assert_eq!(universe.len(), init_role::ALL.len());
        assert!(PredefinedRoles::is_administrator(&RoleCode::new(
            init_role::PROJECT_ADMINISTRATOR
        )));
        assert!(!PredefinedRoles::is_administrator(&RoleCode::new(
            init_role::PROJECT_MEMBER
        )));
    }
}
