//! Per-run view of the predefined roles.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use permsync_core::ResourceLevel;

use crate::role::{PredefinedRoles, Role, RoleCode};

/// Predefined roles resolved at the start of a synchronization run.
///
/// Built fresh for every run and passed down explicitly, so runs never share
/// role lookups and a role provisioned between two runs is picked up by the
/// next one.
#[derive(Debug, Clone)]
pub struct RoleDirectory {
    universe: PredefinedRoles,
    roles: HashMap<RoleCode, Role>,
}

impl RoleDirectory {
    /// Keep the given roles that belong to `universe`; anything else is ignored.
    pub fn new(universe: PredefinedRoles, roles: impl IntoIterator<Item = Role>) -> Self {
        let roles = roles
            .into_iter()
            .filter(|r| universe.contains(&r.code))
            .map(|r| (r.code.clone(), r))
            .collect();
        Self { universe, roles }
    }

    pub fn universe(&self) -> &PredefinedRoles {
        &self.universe
    }

    pub fn get(&self, code: &RoleCode) -> Option<&Role> {
        self.roles.get(code)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Administrator role for `level`, if it has been provisioned.
    pub fn administrator_for(&self, level: ResourceLevel) -> Option<&Role> {
        self.get(&PredefinedRoles::administrator_for(level))
    }

    /// Universe codes with no provisioned role.
    pub fn missing(&self) -> Vec<&RoleCode> {
        self.universe
            .iter()
            .filter(|c| !self.roles.contains_key(*c))
            .collect()
    }

    /// Resolve declared role codes to the set a permission of `level` should
    /// be linked to.
    ///
    /// Duplicates collapse. Unknown codes and roles of another level are
    /// logged and dropped; neither fails the declaration.
    pub fn desired_roles(&self, level: ResourceLevel, declared: &[RoleCode]) -> BTreeSet<RoleCode> {
        let unique: BTreeSet<&RoleCode> = declared.iter().collect();
        let mut desired = BTreeSet::new();

        for code in unique {
            match self.get(code) {
                None => {
                    info!(role_code = %code, "can not find the role, role code is unknown or not provisioned");
                }
                Some(role) if role.level != level => {
                    info!(
                        role_code = %role.code,
                        role_level = %role.level,
                        permission_level = %level,
                        "init role level does not match the permission level"
                    );
                }
                Some(role) => {
                    desired.insert(role.code.clone());
                }
            }
        }

        desired
    }
}
