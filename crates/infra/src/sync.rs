//! One synchronization run: document in, reconciled catalog out.
//!
//! ```text
//! InstanceEvent → [sweep] → fetch → extract → decode → upsert → role links
//! ```
//!
//! Document-level failures abort the run. Everything below the document
//! (bad metadata, unknown roles, store errors on a single permission) is
//! logged, counted in the [`SyncReport`], and the run moves on.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use permsync_catalog::{
    DocumentError, MetadataDecode, PermissionCode, PermissionDraft, RoleCode, RoleDirectory,
    decode_metadata, extract_endpoints, parse_document,
};
use permsync_events::InstanceEvent;

use crate::config::SyncConfig;
use crate::fetch::{DocumentFetcher, FetchError};
use crate::reconcile::{
    PermissionOutcome, PermissionReconciler, SweepReport, UpsertKind, load_directory,
    sweep_level_mismatches,
};
use crate::store::{CatalogStore, StoreError};

/// Run-level failure.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("api docs of {service} could not be read: {source}")]
    Document {
        service: String,
        #[source]
        source: DocumentError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of reconciling the winning declaration of one permission code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    Reconciled(PermissionOutcome),
    Failed { code: PermissionCode, error: String },
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub service_name: String,
    /// Endpoints whose tags followed the naming convention.
    pub endpoints: usize,
    pub illegal: usize,
    pub skipped_no_metadata: usize,
    pub skipped_malformed: usize,
    /// Declarations overridden by a later endpoint with the same code.
    pub superseded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub links_added: usize,
    pub links_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
}

impl SyncReport {
    fn record(&mut self, outcome: &EndpointOutcome) {
        match outcome {
            EndpointOutcome::Reconciled(outcome) => {
                match outcome.kind {
                    UpsertKind::Inserted => self.inserted += 1,
                    UpsertKind::Updated => self.updated += 1,
                    UpsertKind::Unchanged => self.unchanged += 1,
                }
                self.links_added += outcome.links.added;
                self.links_removed += outcome.links.removed;
            }
            EndpointOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Whether the run changed the catalog (sweep excluded).
    pub fn wrote_anything(&self) -> bool {
        self.inserted + self.updated + self.links_added + self.links_removed > 0
    }
}

/// A decoded endpoint, ready for reconciliation.
struct Declared {
    draft: PermissionDraft,
    roles: Vec<RoleCode>,
}

/// Orchestrates synchronization runs against one catalog store.
///
/// Cheap to share behind an `Arc`; runs for different services may proceed
/// concurrently. Sweeps are serialized: a sweep requested while another is in
/// flight is reported as skipped.
pub struct SyncEngine {
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn DocumentFetcher>,
    config: SyncConfig,
    sweep_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn DocumentFetcher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Synchronize the catalog with the document published by an instance.
    #[instrument(skip_all, fields(service = %event.service_name, version = %event.version), err)]
    pub async fn sync(&self, event: &InstanceEvent) -> Result<SyncReport, SyncError> {
        if event.service_name.trim().is_empty() {
            return Err(SyncError::InvalidTrigger("service name is empty".to_string()));
        }
        if event.instance_address.trim().is_empty() {
            return Err(SyncError::InvalidTrigger(
                "instance address is empty".to_string(),
            ));
        }

        let sweep = if self.config.clean_role_permission {
            match self.sweep().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "clean error role_permission failed; continuing with sync");
                    None
                }
            }
        } else {
            None
        };

        info!(
            address = %event.instance_address,
            "receive message from registry, start syncing permissions"
        );

        let body = self.fetcher.fetch(event).await?;
        let mut report = self.sync_document(&event.service_name, &body).await?;
        report.sweep = sweep;
        Ok(report)
    }

    /// Reconcile the catalog against an already-fetched document body.
    #[instrument(skip(self, body), err)]
    pub async fn sync_document(&self, service: &str, body: &str) -> Result<SyncReport, SyncError> {
        if service.trim().is_empty() {
            return Err(SyncError::InvalidTrigger("service name is empty".to_string()));
        }

        let document_error = |source| SyncError::Document {
            service: service.to_string(),
            source,
        };
        let document = parse_document(body).map_err(document_error)?;
        let extraction = extract_endpoints(&document).map_err(document_error)?;

        let directory =
            load_directory(self.store.as_ref(), &self.config.predefined_roles).await?;
        if directory.is_empty() {
            warn!("no predefined role is provisioned; only permissions will be written");
        }

        let mut report = SyncReport {
            service_name: service.to_string(),
            endpoints: extraction.endpoints.len(),
            illegal: extraction.illegal,
            ..SyncReport::default()
        };

        // The last declaration of a code wins; earlier ones are never written
        // so an unchanged document stays a no-op. Distinct codes run in parallel.
        let mut declared: Vec<Declared> = Vec::new();
        let mut index: HashMap<PermissionCode, usize> = HashMap::new();

        for endpoint in &extraction.endpoints {
            match decode_metadata(endpoint.description.as_ref()) {
                MetadataDecode::Declared(declaration) => {
                    let draft = declaration.to_draft(service, endpoint);
                    let next = Declared {
                        roles: declaration.role_codes().to_vec(),
                        draft,
                    };
                    match index.get(&next.draft.code).copied() {
                        Some(slot) => {
                            debug!(
                                code = %next.draft.code,
                                path = %endpoint.path,
                                method = %endpoint.method,
                                "permission code declared again, later endpoint wins"
                            );
                            report.superseded += 1;
                            declared[slot] = next;
                        }
                        None => {
                            index.insert(next.draft.code.clone(), declared.len());
                            declared.push(next);
                        }
                    }
                }
                MetadataDecode::Absent => {
                    debug!(path = %endpoint.path, method = %endpoint.method, "no permission metadata, skip");
                    report.skipped_no_metadata += 1;
                }
                MetadataDecode::Malformed(reason) => {
                    info!(
                        path = %endpoint.path,
                        method = %endpoint.method,
                        reason = %reason,
                        "error.permission.parse, skip endpoint"
                    );
                    report.skipped_malformed += 1;
                }
            }
        }

        let concurrency = self.config.endpoint_concurrency.max(1);
        let pending: Vec<_> = declared
            .into_iter()
            .map(|declared| self.reconcile_one(&directory, declared))
            .collect();
        let outcomes: Vec<EndpointOutcome> = stream::iter(pending)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in &outcomes {
            report.record(outcome);
        }

        info!(
            endpoints = report.endpoints,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            links_added = report.links_added,
            links_removed = report.links_removed,
            "sync permissions finished"
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        directory: &RoleDirectory,
        Declared { draft, roles }: Declared,
    ) -> EndpointOutcome {
        let reconciler = PermissionReconciler::new(
            self.store.as_ref(),
            directory,
            self.config.max_conflict_retries,
        );

        let code = draft.code.clone();
        match reconciler.reconcile(draft, &roles).await {
            Ok(outcome) => EndpointOutcome::Reconciled(outcome),
            Err(e) => {
                warn!(code = %code, error = %e, "reconciling permission failed, skip");
                EndpointOutcome::Failed {
                    code,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Remove role links whose role and permission levels differ.
    ///
    /// Returns a skipped report when another sweep holds the lock.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            info!("clean error role_permission already running, skip");
            return Ok(SweepReport::skipped());
        };
        sweep_level_mismatches(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::LinkChanges;
    use crate::store::{InMemoryCatalog, PermissionStore, RoleStore};
    use crate::testing::seeded_catalog;
    use async_trait::async_trait;
    use permsync_catalog::{Role, RolePermission, init_role};
    use permsync_core::{ObjectVersion, ResourceLevel};
    use serde_json::json;

    struct StaticFetcher(String);

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, _event: &InstanceEvent) -> Result<String, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn envelope(action: &str, level: &str, roles: Option<&[&str]>) -> String {
        json!({
            "permission": {
                "action": action,
                "permissionLevel": level,
                "permissionPublic": false,
                "permissionLogin": false,
                "permissionWithin": false,
                "roles": roles,
            }
        })
        .to_string()
    }

    fn document() -> String {
        json!({
            "paths": {
                "/v1/users": {
                    "post": {
                        "tags": ["user-controller"],
                        "summary": "create user",
                        "description": envelope("create", "site", Some(&[init_role::SITE_DEVELOPER])),
                    },
                    "get": {
                        "tags": ["user-controller"],
                        "summary": "list users",
                        "description": envelope("list", "site", None),
                    }
                },
                "/v1/projects/{id}": {
                    "get": {
                        "tags": ["project-controller"],
                        "description": envelope("query", "project", Some(&[init_role::PROJECT_MEMBER])),
                    },
                    "delete": {
                        "tags": ["project-controller"],
                        "description": "{not json",
                    },
                    "put": {
                        "tags": ["project-controller"]
                    }
                },
                "/internal/ping": {
                    "get": { "tags": ["ping"], "description": envelope("ping", "site", None) }
                }
            }
        })
        .to_string()
    }

    fn engine(store: Arc<InMemoryCatalog>, body: String, config: SyncConfig) -> SyncEngine {
        SyncEngine::new(store, Arc::new(StaticFetcher(body)), config)
    }

    fn event() -> InstanceEvent {
        InstanceEvent::new("iam-service", "1.0.0", "127.0.0.1:1")
    }

    #[tokio::test]
    async fn first_run_populates_catalog_and_counts_skips() {
        let store = Arc::new(seeded_catalog());
        let engine = engine(store.clone(), document(), SyncConfig::default());

        let report = engine.sync(&event()).await.unwrap();

        assert_eq!(report.endpoints, 5);
        assert_eq!(report.illegal, 1);
        assert_eq!(report.skipped_no_metadata, 1);
        assert_eq!(report.skipped_malformed, 1);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.links_added, 5);
        assert!(report.sweep.is_some());

        let create = store
            .select_permission_by_code(&PermissionCode::new("iam-service.user.create"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(create.description, "create user");
        assert_eq!(
            store.role_codes_for(create.id),
            vec![
                RoleCode::new(init_role::SITE_ADMINISTRATOR),
                RoleCode::new(init_role::SITE_DEVELOPER),
            ]
        );

        let query = store
            .select_permission_by_code(&PermissionCode::new("iam-service.project.query"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(query.description, "");
        assert_eq!(query.level, ResourceLevel::Project);
    }

    #[tokio::test]
    async fn second_run_writes_nothing() {
        let store = Arc::new(seeded_catalog());
        let engine = engine(store.clone(), document(), SyncConfig::default());

        engine.sync(&event()).await.unwrap();
        let writes = store.write_count();
        let ids: Vec<_> = {
            let mut p = store.permissions();
            p.sort_by(|a, b| a.code.cmp(&b.code));
            p.into_iter().map(|p| (p.code, p.id, p.object_version_number)).collect()
        };

        let report = engine.sync(&event()).await.unwrap();

        assert!(!report.wrote_anything());
        assert_eq!(report.unchanged, 3);
        assert_eq!(store.write_count(), writes);
        let mut after = store.permissions();
        after.sort_by(|a, b| a.code.cmp(&b.code));
        let after: Vec<_> = after
            .into_iter()
            .map(|p| (p.code, p.id, p.object_version_number))
            .collect();
        assert_eq!(after, ids);
        assert!(after.iter().all(|(_, _, v)| *v == ObjectVersion::INITIAL));
    }

    #[tokio::test]
    async fn duplicate_codes_keep_the_last_declaration() {
        let body = json!({
            "paths": {
                "/v1/a": { "get": { "tags": ["item-controller"], "summary": "first",
                    "description": envelope("read", "site", None) } },
                "/v1/b": { "get": { "tags": ["item-controller"], "summary": "second",
                    "description": envelope("read", "site", None) } }
            }
        })
        .to_string();
        let store = Arc::new(seeded_catalog());
        let engine = engine(store.clone(), body, SyncConfig::default());
        let report = engine.sync(&event()).await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.superseded, 1);
        let item = store
            .select_permission_by_code(&PermissionCode::new("iam-service.item.read"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.path, "/v1/b");
        assert_eq!(item.description, "second");

        let writes = store.write_count();
        let again = engine.sync(&event()).await.unwrap();
        assert!(!again.wrote_anything());
        assert_eq!(again.unchanged, 1);
        assert_eq!(store.write_count(), writes);
        let after = store
            .select_permission_by_code(&PermissionCode::new("iam-service.item.read"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.object_version_number, item.object_version_number);
    }

    #[tokio::test]
    async fn sync_sweeps_stale_links_first_when_enabled() {
        let store = Arc::new(seeded_catalog());
        let site_admin = role(&store, init_role::SITE_ADMINISTRATOR).await;

        let engine = engine(store.clone(), document(), SyncConfig::default());
        engine.sync(&event()).await.unwrap();
        let query = store
            .select_permission_by_code(&PermissionCode::new("iam-service.project.query"))
            .await
            .unwrap()
            .unwrap();
        store.inject_link(RolePermission::new(site_admin.id, query.id)).unwrap();

        let report = engine.sync(&event()).await.unwrap();
        assert_eq!(report.sweep.map(|s| s.removed), Some(1));
        assert!(!store.role_codes_for(query.id).contains(&RoleCode::new(init_role::SITE_ADMINISTRATOR)));

        let disabled = SyncEngine::new(
            store.clone(),
            Arc::new(StaticFetcher(document())),
            SyncConfig::default().with_clean_role_permission(false),
        );
        store.inject_link(RolePermission::new(site_admin.id, query.id)).unwrap();
        let report = disabled.sync(&event()).await.unwrap();
        assert!(report.sweep.is_none());
        assert!(store.role_codes_for(query.id).contains(&RoleCode::new(init_role::SITE_ADMINISTRATOR)));
    }

    #[tokio::test]
    async fn concurrent_sweep_is_reported_as_skipped() {
        let store = Arc::new(seeded_catalog());
        let engine = engine(store, document(), SyncConfig::default());

        let held = engine.sweep_lock.lock().await;
        let report = engine.sweep().await.unwrap();
        assert!(report.skipped);
        drop(held);

        assert!(!engine.sweep().await.unwrap().skipped);
    }

    #[tokio::test]
    async fn broken_document_fails_the_run() {
        let store = Arc::new(seeded_catalog());
        let err = engine(store.clone(), "{\"swagger\":\"2.0\"}".to_string(), SyncConfig::default())
            .sync(&event())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Document {
                source: DocumentError::MissingPaths,
                ..
            }
        ));

        let err = engine(store.clone(), "<html>".to_string(), SyncConfig::default())
            .sync(&event())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Document { source: DocumentError::Json(_), .. }));
        assert!(store.permissions().is_empty());
    }

    #[tokio::test]
    async fn empty_service_name_is_rejected() {
        let store = Arc::new(seeded_catalog());
        let err = engine(store, document(), SyncConfig::default())
            .sync(&InstanceEvent::new("  ", "1", "127.0.0.1:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTrigger(_)));
    }

    #[test]
    fn report_counts_outcomes() {
        let mut report = SyncReport::default();
        report.record(&EndpointOutcome::Reconciled(PermissionOutcome {
            code: PermissionCode::new("a.b.c"),
            kind: UpsertKind::Inserted,
            links: LinkChanges { added: 2, removed: 0 },
        }));
        report.record(&EndpointOutcome::Failed {
            code: PermissionCode::new("a.b.d"),
            error: "boom".to_string(),
        });

        assert_eq!(report.inserted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.links_added, 2);
        assert!(report.wrote_anything());
    }

    async fn role(store: &InMemoryCatalog, code: &'static str) -> Role {
        store
            .select_role_by_code(&RoleCode::new(code))
            .await
            .unwrap()
            .unwrap()
    }
}
