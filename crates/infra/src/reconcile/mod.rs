//! Catalog reconciliation: permission upsert and role-link convergence.

pub mod permission;
pub mod roles;

use serde::Serialize;
use tracing::warn;

use permsync_catalog::{PredefinedRoles, RoleDirectory};

use crate::store::{CatalogStore, StoreError};

pub use permission::{PermissionOutcome, PermissionReconciler, UpsertKind};
pub use roles::{RoleAssociationReconciler, SweepReport, sweep_level_mismatches};

/// Role links written while reconciling one permission.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkChanges {
    pub added: usize,
    pub removed: usize,
}

impl LinkChanges {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

impl core::ops::AddAssign for LinkChanges {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.removed += rhs.removed;
    }
}

/// Resolve every predefined role code against the store.
///
/// Codes with no provisioned role are logged and left out of the directory.
pub async fn load_directory<S>(
    store: &S,
    universe: &PredefinedRoles,
) -> Result<RoleDirectory, StoreError>
where
    S: CatalogStore + ?Sized,
{
    let mut roles = Vec::with_capacity(universe.len());
    for code in universe.iter() {
        if let Some(role) = store.select_role_by_code(code).await? {
            roles.push(role);
        }
    }
    let directory = RoleDirectory::new(universe.clone(), roles);
    for code in directory.missing() {
        warn!(role_code = %code, "predefined role is not provisioned");
    }
    Ok(directory)
}
