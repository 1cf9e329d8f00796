use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use permsync_catalog::{
    Permission, Role, RoleCode, RoleDirectory, RolePermission, RoleSyncPlan, plan,
};
use permsync_core::RoleId;

use super::LinkChanges;
use crate::store::{CatalogStore, StoreError};

/// Keeps a permission's role links in line with its latest declaration.
///
/// - the administrator role of the permission's level always holds it
/// - other predefined roles hold it exactly when declared (and level-matching)
/// - roles outside the predefined universe are never touched
pub struct RoleAssociationReconciler<'a, S: ?Sized> {
    store: &'a S,
    directory: &'a RoleDirectory,
}

impl<'a, S> RoleAssociationReconciler<'a, S>
where
    S: CatalogStore + ?Sized,
{
    pub fn new(store: &'a S, directory: &'a RoleDirectory) -> Self {
        Self { store, directory }
    }

    /// First sighting of a permission: link the administrator role, then any
    /// declared custom roles.
    #[instrument(skip_all, fields(code = %permission.code, level = %permission.level), err)]
    pub async fn on_insert(
        &self,
        permission: &Permission,
        declared: &[RoleCode],
    ) -> Result<LinkChanges, StoreError> {
        let mut changes = LinkChanges::default();
        let mut actual = BTreeSet::new();

        match self.directory.administrator_for(permission.level) {
            Some(admin) => {
                if self.link(admin.id, permission).await? {
                    changes.added += 1;
                }
                actual.insert(admin.code.clone());
            }
            None => warn!("administrator role of level {} is not provisioned", permission.level),
        }

        if declared.is_empty() {
            return Ok(changes);
        }

        let desired = self.directory.desired_roles(permission.level, declared);
        let plan = plan(&desired, &actual, self.directory.universe());
        changes += self.apply(permission, &plan, &HashMap::new()).await?;
        Ok(changes)
    }

    /// Re-sighting of a permission: make sure the administrator link exists,
    /// then converge the predefined-role links on the declared set.
    #[instrument(skip_all, fields(code = %permission.code, level = %permission.level), err)]
    pub async fn on_update(
        &self,
        permission: &Permission,
        declared: &[RoleCode],
    ) -> Result<LinkChanges, StoreError> {
        let mut changes = LinkChanges::default();

        if let Some(admin) = self.directory.administrator_for(permission.level) {
            let link = RolePermission::new(admin.id, permission.id);
            if !self.store.link_exists(link).await? && self.link(admin.id, permission).await? {
                changes.added += 1;
            }
        }

        let linked = self
            .store
            .select_predefined_by_permission(permission.id, self.directory.universe())
            .await?;
        let linked: HashMap<RoleCode, _> = linked.into_iter().map(|r| (r.code.clone(), r)).collect();
        let actual: BTreeSet<RoleCode> = linked.keys().cloned().collect();

        let desired = self.directory.desired_roles(permission.level, declared);
        let plan = plan(&desired, &actual, self.directory.universe());
        if !plan.is_empty() {
            debug!(
                to_delete = ?plan.to_delete,
                to_insert = ?plan.to_insert,
                "resync role links"
            );
        }

        changes += self.apply(permission, &plan, &linked).await?;
        Ok(changes)
    }

    async fn apply(
        &self,
        permission: &Permission,
        plan: &RoleSyncPlan,
        linked: &HashMap<RoleCode, Role>,
    ) -> Result<LinkChanges, StoreError> {
        let mut changes = LinkChanges::default();

        for code in &plan.to_delete {
            let Some(role) = linked.get(code) else {
                continue;
            };
            if self
                .store
                .delete_link(RolePermission::new(role.id, permission.id))
                .await?
            {
                changes.removed += 1;
            }
        }

        for code in &plan.to_insert {
            let Some(role) = self.directory.get(code) else {
                continue;
            };
            if self.link(role.id, permission).await? {
                changes.added += 1;
            }
        }

        Ok(changes)
    }

    /// Insert a link; a concurrent run having linked the pair first is fine.
    async fn link(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> Result<bool, StoreError> {
        match self
            .store
            .insert_link(RolePermission::new(role_id, permission.id))
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Outcome of a level-mismatch sweep.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub roles_scanned: usize,
    pub removed: usize,
    /// Another sweep was already running; nothing was done.
    pub skipped: bool,
}

impl SweepReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Delete every role link whose role and permission levels differ.
#[instrument(skip_all, err)]
pub async fn sweep_level_mismatches<S>(store: &S) -> Result<SweepReport, StoreError>
where
    S: CatalogStore + ?Sized,
{
    let roles = store.select_all_roles().await?;
    let mut report = SweepReport {
        roles_scanned: roles.len(),
        ..SweepReport::default()
    };

    for role in &roles {
        for permission in store.select_level_mismatched_by_role(role).await? {
            if store
                .delete_link(RolePermission::new(role.id, permission.id))
                .await?
            {
                debug!(
                    role_id = %role.id,
                    role_code = %role.code,
                    role_level = %role.level,
                    permission_id = %permission.id,
                    permission_code = %permission.code,
                    permission_level = %permission.level,
                    "delete error role_permission"
                );
                report.removed += 1;
            }
        }
    }

    info!(total = report.removed, "clean error role_permission finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryCatalog, PermissionStore};
    use crate::testing::{directory_for, draft, seeded_catalog};
    use permsync_catalog::init_role;
    use permsync_core::ResourceLevel;

    fn codes(list: &[&'static str]) -> Vec<RoleCode> {
        list.iter().map(|c| RoleCode::new(*c)).collect()
    }

    async fn inserted(store: &InMemoryCatalog, code: &'static str, level: ResourceLevel) -> Permission {
        store.insert_permission(draft(code, level)).await.unwrap()
    }

    #[tokio::test]
    async fn insert_links_administrator_even_without_declared_roles() {
        let store = seeded_catalog();
        let directory = directory_for(&store).await;
        let permission = inserted(&store, "svc.org.list", ResourceLevel::Organization).await;

        let changes = RoleAssociationReconciler::new(&store, &directory)
            .on_insert(&permission, &[])
            .await
            .unwrap();

        assert_eq!(changes, LinkChanges { added: 1, removed: 0 });
        assert_eq!(
            store.role_codes_for(permission.id),
            codes(&[init_role::ORGANIZATION_ADMINISTRATOR])
        );
    }

    #[tokio::test]
    async fn insert_skips_unknown_and_mismatched_roles() {
        let store = seeded_catalog();
        let directory = directory_for(&store).await;
        let permission = inserted(&store, "svc.prj.deploy", ResourceLevel::Project).await;

        let declared = codes(&[
            init_role::DEPLOY_ADMINISTRATOR,
            "role/project/default/no-such-role",
            init_role::SITE_DEVELOPER,
        ]);
        RoleAssociationReconciler::new(&store, &directory)
            .on_insert(&permission, &declared)
            .await
            .unwrap();

        assert_eq!(
            store.role_codes_for(permission.id),
            codes(&[init_role::PROJECT_ADMINISTRATOR, init_role::DEPLOY_ADMINISTRATOR])
        );
    }

    #[tokio::test]
    async fn update_replaces_dropped_roles_and_keeps_administrator() {
        let store = seeded_catalog();
        let tester = store.add_role(Role::new(
            RoleId::new(),
            "role/project/default/tester",
            ResourceLevel::Project,
        ))
        .unwrap();
        let mut universe = store_universe();
        universe.push(tester.code.as_str().to_string());
        let directory = crate::testing::directory_with(&store, universe).await;
        let permission = inserted(&store, "svc.prj.build", ResourceLevel::Project).await;
        let reconciler = RoleAssociationReconciler::new(&store, &directory);

        reconciler
            .on_insert(&permission, &codes(&[init_role::PROJECT_MEMBER, init_role::DEPLOY_ADMINISTRATOR]))
            .await
            .unwrap();

        let changes = reconciler
            .on_update(&permission, &codes(&[init_role::DEPLOY_ADMINISTRATOR, "role/project/default/tester"]))
            .await
            .unwrap();

        assert_eq!(changes, LinkChanges { added: 1, removed: 1 });
        assert_eq!(
            store.role_codes_for(permission.id),
            codes(&[
                init_role::PROJECT_ADMINISTRATOR,
                init_role::DEPLOY_ADMINISTRATOR,
                "role/project/default/tester",
            ])
        );

        let again = reconciler
            .on_update(&permission, &codes(&[init_role::DEPLOY_ADMINISTRATOR, "role/project/default/tester"]))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn update_restores_missing_administrator_and_ignores_foreign_roles() {
        let store = seeded_catalog();
        let custom = store.add_role(Role::new(
            RoleId::new(),
            "tenant/acme/auditor",
            ResourceLevel::Site,
        ))
        .unwrap();
        let directory = directory_for(&store).await;
        let permission = inserted(&store, "svc.site.audit", ResourceLevel::Site).await;
        store.inject_link(RolePermission::new(custom.id, permission.id)).unwrap();

        let changes = RoleAssociationReconciler::new(&store, &directory)
            .on_update(&permission, &[])
            .await
            .unwrap();

        assert_eq!(changes, LinkChanges { added: 1, removed: 0 });
        assert_eq!(
            store.role_codes_for(permission.id),
            codes(&[init_role::SITE_ADMINISTRATOR, "tenant/acme/auditor"])
        );
    }

    #[tokio::test]
    async fn sweep_removes_only_level_mismatched_links() {
        let store = seeded_catalog();
        let directory = directory_for(&store).await;
        let site = inserted(&store, "svc.a.list", ResourceLevel::Site).await;
        let project = inserted(&store, "svc.b.list", ResourceLevel::Project).await;
        let site_admin = directory.administrator_for(ResourceLevel::Site).unwrap().clone();
        let project_admin = directory.administrator_for(ResourceLevel::Project).unwrap().clone();

        store.inject_link(RolePermission::new(site_admin.id, site.id)).unwrap();
        store.inject_link(RolePermission::new(project_admin.id, project.id)).unwrap();
        store.inject_link(RolePermission::new(site_admin.id, project.id)).unwrap();

        let report = sweep_level_mismatches(&store).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.roles_scanned, init_role::ALL.len());
        assert_eq!(store.link_count(), 2);
        assert_eq!(store.role_codes_for(project.id), codes(&[init_role::PROJECT_ADMINISTRATOR]));

        let again = sweep_level_mismatches(&store).await.unwrap();
        assert_eq!(again.removed, 0);
    }

    fn store_universe() -> Vec<String> {
        init_role::ALL.iter().map(|c| c.to_string()).collect()
    }
}
