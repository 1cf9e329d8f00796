use serde::Serialize;
use tracing::{debug, instrument, warn};

use permsync_catalog::{Permission, PermissionCode, PermissionDraft, RoleCode, RoleDirectory};

use super::{LinkChanges, RoleAssociationReconciler};
use crate::store::{CatalogStore, StoreError};

/// What the upsert did to the permission row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    Inserted,
    Updated,
    /// Stored attributes already matched the declaration; nothing written.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionOutcome {
    pub code: PermissionCode,
    pub kind: UpsertKind,
    pub links: LinkChanges,
}

/// Insert-or-update of one declared permission, followed by role-link
/// reconciliation.
///
/// The update is a read-modify-write guarded by the row's version token. A
/// stale token (or losing an insert race on the code) re-reads and tries again,
/// up to `max_conflict_retries` extra attempts.
pub struct PermissionReconciler<'a, S: ?Sized> {
    store: &'a S,
    directory: &'a RoleDirectory,
    max_conflict_retries: u32,
}

impl<'a, S> PermissionReconciler<'a, S>
where
    S: CatalogStore + ?Sized,
{
    pub fn new(store: &'a S, directory: &'a RoleDirectory, max_conflict_retries: u32) -> Self {
        Self {
            store,
            directory,
            max_conflict_retries,
        }
    }

    #[instrument(skip_all, fields(code = %draft.code), err)]
    pub async fn reconcile(
        &self,
        draft: PermissionDraft,
        declared: &[RoleCode],
    ) -> Result<PermissionOutcome, StoreError> {
        let (permission, kind) = self.upsert(draft).await?;

        let roles = RoleAssociationReconciler::new(self.store, self.directory);
        let links = match kind {
            UpsertKind::Inserted => roles.on_insert(&permission, declared).await?,
            UpsertKind::Updated | UpsertKind::Unchanged => {
                roles.on_update(&permission, declared).await?
            }
        };

        Ok(PermissionOutcome {
            code: permission.code,
            kind,
            links,
        })
    }

    async fn upsert(&self, draft: PermissionDraft) -> Result<(Permission, UpsertKind), StoreError> {
        let mut attempt = 0;
        loop {
            match self.upsert_once(draft.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "retrying permission upsert");
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempts = attempt + 1, error = %e, "permission upsert kept conflicting");
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    async fn upsert_once(
        &self,
        draft: PermissionDraft,
    ) -> Result<(Permission, UpsertKind), StoreError> {
        let Some(stored) = self.store.select_permission_by_code(&draft.code).await? else {
            let inserted = self.store.insert_permission(draft).await?;
            return Ok((inserted, UpsertKind::Inserted));
        };

        let candidate = draft.into_permission(stored.id, stored.object_version_number);
        if candidate == stored {
            return Ok((stored, UpsertKind::Unchanged));
        }

        let updated = self.store.update_permission(&candidate).await?;
        Ok((updated, UpsertKind::Updated))
    }
}
