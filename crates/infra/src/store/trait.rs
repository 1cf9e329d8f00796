use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use permsync_catalog::{
    Permission, PermissionCode, PermissionDraft, PredefinedRoles, Role, RoleCode, RolePermission,
};
use permsync_core::PermissionId;

/// Catalog store operation error.
///
/// These are **infrastructure errors**. `Conflict` and `Duplicate` are the two
/// serialization points of concurrent synchronization runs and are retried by
/// the reconciler with a fresh read; everything else is reported as is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed (stale version token).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// A unique key (permission code, role/permission pair) already exists.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether re-reading and retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Duplicate(_))
    }
}

/// Permission records keyed by their derived code.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn select_permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError>;

    /// Insert a new permission, assigning its id and initial version.
    ///
    /// Fails with `Duplicate` when the code is already taken.
    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError>;

    /// Overwrite a permission if its version token still matches, returning
    /// the record with the bumped version.
    async fn update_permission(&self, permission: &Permission) -> Result<Permission, StoreError>;

    /// Permissions linked to `role` whose level differs from the role's.
    async fn select_level_mismatched_by_role(&self, role: &Role) -> Result<Vec<Permission>, StoreError>;
}

/// Read-only role lookups.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn select_all_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn select_role_by_code(&self, code: &RoleCode) -> Result<Option<Role>, StoreError>;

    /// Roles from `universe` currently linked to a permission.
    async fn select_predefined_by_permission(
        &self,
        permission_id: PermissionId,
        universe: &PredefinedRoles,
    ) -> Result<Vec<Role>, StoreError>;
}

/// The role/permission association table.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    async fn link_exists(&self, link: RolePermission) -> Result<bool, StoreError>;

    /// Fails with `Duplicate` when the pair is already linked.
    async fn insert_link(&self, link: RolePermission) -> Result<(), StoreError>;

    /// Returns whether a link was removed.
    async fn delete_link(&self, link: RolePermission) -> Result<bool, StoreError>;
}

/// Everything the sync engine needs from storage.
pub trait CatalogStore: PermissionStore + RoleStore + RolePermissionStore {}

impl<S> CatalogStore for S where S: PermissionStore + RoleStore + RolePermissionStore {}

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn select_permission_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        (**self).select_permission_by_code(code).await
    }

    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        (**self).insert_permission(draft).await
    }

    async fn update_permission(&self, permission: &Permission) -> Result<Permission, StoreError> {
        (**self).update_permission(permission).await
    }

    async fn select_level_mismatched_by_role(&self, role: &Role) -> Result<Vec<Permission>, StoreError> {
        (**self).select_level_mismatched_by_role(role).await
    }
}

#[async_trait]
impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    async fn select_all_roles(&self) -> Result<Vec<Role>, StoreError> {
        (**self).select_all_roles().await
    }

    async fn select_role_by_code(&self, code: &RoleCode) -> Result<Option<Role>, StoreError> {
        (**self).select_role_by_code(code).await
    }

    async fn select_predefined_by_permission(
        &self,
        permission_id: PermissionId,
        universe: &PredefinedRoles,
    ) -> Result<Vec<Role>, StoreError> {
        (**self)
            .select_predefined_by_permission(permission_id, universe)
            .await
    }
}

#[async_trait]
impl<S> RolePermissionStore for Arc<S>
where
    S: RolePermissionStore + ?Sized,
{
    async fn link_exists(&self, link: RolePermission) -> Result<bool, StoreError> {
        (**self).link_exists(link).await
    }

    async fn insert_link(&self, link: RolePermission) -> Result<(), StoreError> {
        (**self).insert_link(link).await
    }

    async fn delete_link(&self, link: RolePermission) -> Result<bool, StoreError> {
        (**self).delete_link(link).await
    }
}
