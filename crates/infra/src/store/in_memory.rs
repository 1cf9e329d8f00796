use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use permsync_catalog::{
    Permission, PermissionCode, PermissionDraft, PredefinedRoles, Role, RoleCode, RolePermission,
};
use permsync_core::{ObjectVersion, PermissionId, ResourceLevel, RoleId};

use super::r#trait::{PermissionStore, RolePermissionStore, RoleStore, StoreError};

/// In-memory permission catalog.
///
/// Intended for tests/dev. Not optimized for performance. Every successful
/// mutation bumps a write counter so tests can assert that a run was a no-op.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    permissions: RwLock<HashMap<PermissionId, Permission>>,
    roles: RwLock<HashMap<RoleId, Role>>,
    links: RwLock<BTreeSet<RolePermission>>,
    writes: AtomicU64,
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-provisioned with one role per predefined code.
    ///
    /// The level is read from the code's second segment
    /// (`role/<level>/default/...`); codes that do not follow that layout are
    /// skipped.
    pub fn with_predefined_roles(universe: &PredefinedRoles) -> Self {
        let roles = universe
            .iter()
            .filter_map(|code| {
                let level = code
                    .as_str()
                    .split('/')
                    .nth(1)
                    .and_then(|segment| segment.parse::<ResourceLevel>().ok())?;
                let role = Role {
                    id: RoleId::new(),
                    code: code.clone(),
                    level,
                };
                Some((role.id, role))
            })
            .collect();
        Self {
            roles: RwLock::new(roles),
            ..Self::default()
        }
    }

    /// Provision a role (roles are owned outside the sync engine).
    pub fn add_role(&self, role: Role) -> Result<Role, StoreError> {
        let mut roles = self.roles.write().map_err(|_| poisoned())?;
        roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Link a role and a permission directly, bypassing reconciliation.
    pub fn inject_link(&self, link: RolePermission) -> Result<(), StoreError> {
        let mut links = self.links.write().map_err(|_| poisoned())?;
        links.insert(link);
        Ok(())
    }

    pub fn permissions(&self) -> Vec<Permission> {
        self.permissions
            .read()
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Codes of the roles linked to a permission, in code order.
    pub fn role_codes_for(&self, permission_id: PermissionId) -> Vec<RoleCode> {
        let (Ok(links), Ok(roles)) = (self.links.read(), self.roles.read()) else {
            return Vec::new();
        };
        let mut codes: Vec<RoleCode> = links
            .iter()
            .filter(|l| l.permission_id == permission_id)
            .filter_map(|l| roles.get(&l.role_id).map(|r| r.code.clone()))
            .collect();
        codes.sort();
        codes
    }

    pub fn link_count(&self) -> usize {
        self.links.read().map(|l| l.len()).unwrap_or_default()
    }

    /// Number of successful mutations since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PermissionStore for InMemoryCatalog {
    async fn select_permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError> {
        let permissions = self.permissions.read().map_err(|_| poisoned())?;
        Ok(permissions.values().find(|p| &p.code == code).cloned())
    }

    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        let mut permissions = self.permissions.write().map_err(|_| poisoned())?;

        if permissions.values().any(|p| p.code == draft.code) {
            return Err(StoreError::Duplicate(format!("permission code {}", draft.code)));
        }

        let permission = draft.into_permission(PermissionId::new(), ObjectVersion::INITIAL);
        permissions.insert(permission.id, permission.clone());
        self.record_write();
        Ok(permission)
    }

    async fn update_permission(&self, permission: &Permission) -> Result<Permission, StoreError> {
        let mut permissions = self.permissions.write().map_err(|_| poisoned())?;

        let stored = permissions
            .get_mut(&permission.id)
            .ok_or_else(|| StoreError::NotFound(format!("permission {}", permission.id)))?;

        permission
            .object_version_number
            .check(stored.object_version_number)
            .map_err(|e| StoreError::Conflict(format!("permission {}: {e}", permission.code)))?;

        let mut updated = permission.clone();
        updated.object_version_number = stored.object_version_number.next();
        *stored = updated.clone();
        self.record_write();
        Ok(updated)
    }

    async fn select_level_mismatched_by_role(&self, role: &Role) -> Result<Vec<Permission>, StoreError> {
        let links = self.links.read().map_err(|_| poisoned())?;
        let permissions = self.permissions.read().map_err(|_| poisoned())?;

        Ok(links
            .iter()
            .filter(|l| l.role_id == role.id)
            .filter_map(|l| permissions.get(&l.permission_id))
            .filter(|p| p.level != role.level)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoleStore for InMemoryCatalog {
    async fn select_all_roles(&self) -> Result<Vec<Role>, StoreError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        let mut all: Vec<Role> = roles.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    async fn select_role_by_code(&self, code: &RoleCode) -> Result<Option<Role>, StoreError> {
        let roles = self.roles.read().map_err(|_| poisoned())?;
        Ok(roles.values().find(|r| &r.code == code).cloned())
    }

    async fn select_predefined_by_permission(
        &self,
        permission_id: PermissionId,
        universe: &PredefinedRoles,
    ) -> Result<Vec<Role>, StoreError> {
        let links = self.links.read().map_err(|_| poisoned())?;
        let roles = self.roles.read().map_err(|_| poisoned())?;

        Ok(links
            .iter()
            .filter(|l| l.permission_id == permission_id)
            .filter_map(|l| roles.get(&l.role_id))
            .filter(|r| universe.contains(&r.code))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RolePermissionStore for InMemoryCatalog {
    async fn link_exists(&self, link: RolePermission) -> Result<bool, StoreError> {
        let links = self.links.read().map_err(|_| poisoned())?;
        Ok(links.contains(&link))
    }

    async fn insert_link(&self, link: RolePermission) -> Result<(), StoreError> {
        let mut links = self.links.write().map_err(|_| poisoned())?;
        if !links.insert(link) {
            return Err(StoreError::Duplicate(format!(
                "role {} already holds permission {}",
                link.role_id, link.permission_id
            )));
        }
        self.record_write();
        Ok(())
    }

    async fn delete_link(&self, link: RolePermission) -> Result<bool, StoreError> {
        let mut links = self.links.write().map_err(|_| poisoned())?;
        let removed = links.remove(&link);
        if removed {
            self.record_write();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_catalog::init_role;

    fn draft(code: &'static str, level: ResourceLevel) -> PermissionDraft {
        PermissionDraft {
            code: PermissionCode::new(code),
            path: "/v1/widgets".to_string(),
            method: "get".to_string(),
            level,
            description: String::new(),
            action: "list".to_string(),
            resource_code: "widget".to_string(),
            is_public: false,
            requires_login: false,
            is_within_organization: false,
            service_name: "widget-service".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_codes() {
        let store = InMemoryCatalog::new();
        let first = store
            .insert_permission(draft("svc.widget.list", ResourceLevel::Site))
            .await
            .unwrap();
        assert_eq!(first.object_version_number, ObjectVersion::INITIAL);

        let err = store
            .insert_permission(draft("svc.widget.list", ResourceLevel::Site))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn update_enforces_version_token() {
        let store = InMemoryCatalog::new();
        let stored = store
            .insert_permission(draft("svc.widget.list", ResourceLevel::Site))
            .await
            .unwrap();

        let mut edit = stored.clone();
        edit.description = "first".to_string();
        let updated = store.update_permission(&edit).await.unwrap();
        assert_eq!(updated.object_version_number, ObjectVersion::new(2));

        // Still carries version 1.
        let mut stale = stored.clone();
        stale.description = "second".to_string();
        let err = store.update_permission(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn level_mismatch_query_only_returns_foreign_levels() {
        let store = InMemoryCatalog::with_predefined_roles(&PredefinedRoles::default());
        let admin = store
            .select_role_by_code(&RoleCode::new(init_role::SITE_ADMINISTRATOR))
            .await
            .unwrap()
            .unwrap();

        let site = store
            .insert_permission(draft("svc.a.list", ResourceLevel::Site))
            .await
            .unwrap();
        let project = store
            .insert_permission(draft("svc.b.list", ResourceLevel::Project))
            .await
            .unwrap();
        store.inject_link(RolePermission::new(admin.id, site.id)).unwrap();
        store.inject_link(RolePermission::new(admin.id, project.id)).unwrap();

        let mismatched = store.select_level_mismatched_by_role(&admin).await.unwrap();
        assert_eq!(mismatched.len(), 1);
        assert_eq!(mismatched[0].id, project.id);
    }

    #[tokio::test]
    async fn predefined_roles_are_seeded_with_levels_from_codes() {
        let store = InMemoryCatalog::with_predefined_roles(&PredefinedRoles::default());
        let roles = store.select_all_roles().await.unwrap();
        assert_eq!(roles.len(), init_role::ALL.len());

        let member = store
            .select_role_by_code(&RoleCode::new(init_role::ORGANIZATION_MEMBER))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(member.level, ResourceLevel::Organization);
    }

    #[test]
    fn poisoned_locks_surface_as_storage_errors() {
        let store = std::sync::Arc::new(InMemoryCatalog::new());
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _roles = poisoner.roles.write().unwrap();
            let _links = poisoner.links.write().unwrap();
            panic!("poison the catalog");
        })
        .join();

        let role = Role::new(RoleId::new(), init_role::SITE_ADMINISTRATOR, ResourceLevel::Site);
        let err = store.add_role(role.clone()).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        let err = store
            .inject_link(RolePermission::new(role.id, PermissionId::new()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }
}
