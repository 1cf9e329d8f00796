//! Two-phase set reconciliation of a permission's predefined-role links.
//!
//! The declaration carries no deletion signal, so the links are recomputed from
//! scratch over the bounded predefined-role universe. Phrased as a diff rather
//! than delete-all-then-reinsert, an unchanged declaration plans no writes.

use std::collections::BTreeSet;

use crate::role::{PredefinedRoles, RoleCode};

/// Writes needed to converge a permission's links on a declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSyncPlan {
    pub to_delete: BTreeSet<RoleCode>,
    pub to_insert: BTreeSet<RoleCode>,
}

impl RoleSyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Plan the link changes for one permission.
///
/// - `to_delete = (actual ∩ universe) − desired − administrators`
/// - `to_insert = desired − actual`
pub fn plan(
    desired: &BTreeSet<RoleCode>,
    actual: &BTreeSet<RoleCode>,
    universe: &PredefinedRoles,
) -> RoleSyncPlan {
    let to_delete = actual
        .iter()
        .filter(|c| universe.contains(c))
        .filter(|c| !PredefinedRoles::is_administrator(c))
        .filter(|c| !desired.contains(*c))
        .cloned()
        .collect();

    let to_insert = desired.difference(actual).cloned().collect();

    RoleSyncPlan {
        to_delete,
        to_insert,
    }
}
