//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use permsync_catalog::{
    Permission, PermissionCode, PermissionDraft, PredefinedRoles, Role, RoleCode, RoleDirectory,
    RolePermission,
};
use permsync_core::{PermissionId, ResourceLevel};

use crate::reconcile::load_directory;
use crate::store::{InMemoryCatalog, PermissionStore, RolePermissionStore, RoleStore, StoreError};

pub fn seeded_catalog() -> InMemoryCatalog {
    InMemoryCatalog::with_predefined_roles(&PredefinedRoles::default())
}

pub async fn directory_for(store: &InMemoryCatalog) -> RoleDirectory {
    load_directory(store, &PredefinedRoles::default())
        .await
        .unwrap()
}

pub async fn directory_with(store: &InMemoryCatalog, universe: Vec<String>) -> RoleDirectory {
    load_directory(store, &PredefinedRoles::new(universe))
        .await
        .unwrap()
}

pub fn draft(code: &'static str, level: ResourceLevel) -> PermissionDraft {
    PermissionDraft {
        code: PermissionCode::new(code),
        path: "/v1/users".to_string(),
        method: "post".to_string(),
        level,
        description: String::new(),
        action: "create".to_string(),
        resource_code: "user".to_string(),
        is_public: false,
        requires_login: false,
        is_within_organization: false,
        service_name: "svc".to_string(),
    }
}

/// Catalog where another writer updates the permission right before each of
/// the first `conflicts` updates, so those updates carry a stale version.
pub struct FlakyCatalog {
    inner: InMemoryCatalog,
    conflicts: AtomicU32,
}

impl FlakyCatalog {
    pub fn new(inner: InMemoryCatalog, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
        }
    }

    pub fn remaining_conflicts(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionStore for FlakyCatalog {
    async fn select_permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError> {
        self.inner.select_permission_by_code(code).await
    }

    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        self.inner.insert_permission(draft).await
    }

    async fn update_permission(&self, permission: &Permission) -> Result<Permission, StoreError> {
        let left = self.conflicts.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts.store(left - 1, Ordering::SeqCst);
            if let Some(mut competing) = self.inner.select_permission_by_code(&permission.code).await? {
                competing.description = format!("concurrent edit {left}");
                self.inner.update_permission(&competing).await?;
            }
        }
        self.inner.update_permission(permission).await
    }

    async fn select_level_mismatched_by_role(&self, role: &Role) -> Result<Vec<Permission>, StoreError> {
        self.inner.select_level_mismatched_by_role(role).await
    }
}

#[async_trait]
impl RoleStore for FlakyCatalog {
    async fn select_all_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.inner.select_all_roles().await
    }

    async fn select_role_by_code(&self, code: &RoleCode) -> Result<Option<Role>, StoreError> {
        self.inner.select_role_by_code(code).await
    }

    async fn select_predefined_by_permission(
        &self,
        permission_id: PermissionId,
        universe: &PredefinedRoles,
    ) -> Result<Vec<Role>, StoreError> {
        self.inner
            .select_predefined_by_permission(permission_id, universe)
            .await
    }
}

#[async_trait]
impl RolePermissionStore for FlakyCatalog {
    async fn link_exists(&self, link: RolePermission) -> Result<bool, StoreError> {
        self.inner.link_exists(link).await
    }

    async fn insert_link(&self, link: RolePermission) -> Result<(), StoreError> {
        self.inner.insert_link(link).await
    }

    async fn delete_link(&self, link: RolePermission) -> Result<bool, StoreError> {
        self.inner.delete_link(link).await
    }
}
