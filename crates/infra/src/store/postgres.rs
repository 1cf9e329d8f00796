//! Postgres-backed permission catalog.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Concurrent insert of the same permission code or link |
//! | Database (foreign key violation) | `23503` | `NotFound` | Link to a role/permission deleted meanwhile |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | Other | N/A | `Storage` | Network errors, pool closed, etc. |
//!
//! Version conflicts are not a database error: `UPDATE ... WHERE
//! object_version_number = $n` simply matches no row and is reported as
//! `Conflict`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use permsync_catalog::{
    Permission, PermissionCode, PermissionDraft, PredefinedRoles, Role, RoleCode, RolePermission,
};
use permsync_core::{ObjectVersion, PermissionId, ResourceLevel, RoleId};

use super::r#trait::{PermissionStore, RolePermissionStore, RoleStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_permission_catalog.sql");

const PERMISSION_COLUMNS: &str = "p.id, p.code, p.path, p.method, p.level, p.description, p.action, \
     p.resource, p.public_access, p.login_access, p.within_organization, p.service_name, \
     p.object_version_number";

/// Postgres-backed catalog.
///
/// Uses the SQLx connection pool (thread-safe). The unique constraint on
/// `iam_permission.code` serializes concurrent first sightings of the same
/// code; the version column serializes updates.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the catalog tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

struct PermissionRow {
    id: Uuid,
    code: String,
    path: String,
    method: String,
    level: String,
    description: String,
    action: String,
    resource: String,
    public_access: bool,
    login_access: bool,
    within_organization: bool,
    service_name: String,
    object_version_number: i64,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for PermissionRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(PermissionRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            path: row.try_get("path")?,
            method: row.try_get("method")?,
            level: row.try_get("level")?,
            description: row.try_get("description")?,
            action: row.try_get("action")?,
            resource: row.try_get("resource")?,
            public_access: row.try_get("public_access")?,
            login_access: row.try_get("login_access")?,
            within_organization: row.try_get("within_organization")?,
            service_name: row.try_get("service_name")?,
            object_version_number: row.try_get("object_version_number")?,
        })
    }
}

impl TryFrom<PermissionRow> for Permission {
    type Error = StoreError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: PermissionId::from_uuid(row.id),
            code: PermissionCode::new(row.code),
            path: row.path,
            method: row.method,
            level: parse_level(&row.level)?,
            description: row.description,
            action: row.action,
            resource_code: row.resource,
            is_public: row.public_access,
            requires_login: row.login_access,
            is_within_organization: row.within_organization,
            service_name: row.service_name,
            object_version_number: ObjectVersion::new(row.object_version_number as u64),
        })
    }
}

struct RoleRow {
    id: Uuid,
    code: String,
    level: String,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RoleRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RoleRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            level: row.try_get("level")?,
        })
    }
}

impl TryFrom<RoleRow> for Role {
    type Error = StoreError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: RoleId::from_uuid(row.id),
            code: RoleCode::new(row.code),
            level: parse_level(&row.level)?,
        })
    }
}

fn parse_level(raw: &str) -> Result<ResourceLevel, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Storage(format!("corrupt level column: {e}")))
}

fn permission_from_row(operation: &str, row: &sqlx::postgres::PgRow) -> Result<Permission, StoreError> {
    PermissionRow::from_row(row)
        .map_err(|e| map_sqlx_error(operation, e))?
        .try_into()
}

fn role_from_row(operation: &str, row: &sqlx::postgres::PgRow) -> Result<Role, StoreError> {
    RoleRow::from_row(row)
        .map_err(|e| map_sqlx_error(operation, e))?
        .try_into()
}

#[async_trait]
impl PermissionStore for PostgresCatalog {
    #[instrument(skip(self), fields(code = %code), err)]
    async fn select_permission_by_code(
        &self,
        code: &PermissionCode,
    ) -> Result<Option<Permission>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM iam_permission p WHERE p.code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("select_permission_by_code", e))?;

        row.map(|r| permission_from_row("select_permission_by_code", &r))
            .transpose()
    }

    #[instrument(skip(self, draft), fields(code = %draft.code), err)]
    async fn insert_permission(&self, draft: PermissionDraft) -> Result<Permission, StoreError> {
        let permission = draft.into_permission(PermissionId::new(), ObjectVersion::INITIAL);

        sqlx::query(
            r#"
            INSERT INTO iam_permission (
                id, code, path, method, level, description, action, resource,
                public_access, login_access, within_organization, service_name,
                object_version_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.code.as_str())
        .bind(&permission.path)
        .bind(&permission.method)
        .bind(permission.level.as_str())
        .bind(&permission.description)
        .bind(&permission.action)
        .bind(&permission.resource_code)
        .bind(permission.is_public)
        .bind(permission.requires_login)
        .bind(permission.is_within_organization)
        .bind(&permission.service_name)
        .bind(permission.object_version_number.get() as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;

        Ok(permission)
    }

    #[instrument(skip(self, permission), fields(code = %permission.code, version = %permission.object_version_number), err)]
    async fn update_permission(&self, permission: &Permission) -> Result<Permission, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE iam_permission SET
                code = $3,
                path = $4,
                method = $5,
                level = $6,
                description = $7,
                action = $8,
                resource = $9,
                public_access = $10,
                login_access = $11,
                within_organization = $12,
                service_name = $13,
                object_version_number = object_version_number + 1
            WHERE id = $1 AND object_version_number = $2
            RETURNING object_version_number
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(permission.object_version_number.get() as i64)
        .bind(permission.code.as_str())
        .bind(&permission.path)
        .bind(&permission.method)
        .bind(permission.level.as_str())
        .bind(&permission.description)
        .bind(&permission.action)
        .bind(&permission.resource_code)
        .bind(permission.is_public)
        .bind(permission.requires_login)
        .bind(permission.is_within_organization)
        .bind(&permission.service_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_permission", e))?;

        if let Some(row) = row {
            let version: i64 = row
                .try_get("object_version_number")
                .map_err(|e| map_sqlx_error("update_permission", e))?;
            let mut updated = permission.clone();
            updated.object_version_number = ObjectVersion::new(version as u64);
            return Ok(updated);
        }

        // No row matched: either the record is gone or its version moved on.
        let exists = sqlx::query("SELECT 1 FROM iam_permission WHERE id = $1")
            .bind(permission.id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_permission", e))?
            .is_some();

        if exists {
            Err(StoreError::Conflict(format!(
                "permission {} is no longer at version {}",
                permission.code, permission.object_version_number
            )))
        } else {
            Err(StoreError::NotFound(format!("permission {}", permission.id)))
        }
    }

    #[instrument(skip(self, role), fields(role_code = %role.code), err)]
    async fn select_level_mismatched_by_role(&self, role: &Role) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PERMISSION_COLUMNS}
            FROM iam_permission p
            JOIN iam_role_permission rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1 AND p.level <> $2
            "#
        ))
        .bind(role.id.as_uuid())
        .bind(role.level.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("select_level_mismatched_by_role", e))?;

        rows.iter()
            .map(|r| permission_from_row("select_level_mismatched_by_role", r))
            .collect()
    }
}

#[async_trait]
impl RoleStore for PostgresCatalog {
    async fn select_all_roles(&self) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query("SELECT id, code, level FROM iam_role ORDER BY code")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_all_roles", e))?;

        rows.iter()
            .map(|r| role_from_row("select_all_roles", r))
            .collect()
    }

    async fn select_role_by_code(&self, code: &RoleCode) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT id, code, level FROM iam_role WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_role_by_code", e))?;

        row.map(|r| role_from_row("select_role_by_code", &r))
            .transpose()
    }

    async fn select_predefined_by_permission(
        &self,
        permission_id: PermissionId,
        universe: &PredefinedRoles,
    ) -> Result<Vec<Role>, StoreError> {
        let codes: Vec<String> = universe.iter().map(|c| c.as_str().to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.code, r.level
            FROM iam_role r
            JOIN iam_role_permission rp ON rp.role_id = r.id
            WHERE rp.permission_id = $1 AND r.code = ANY($2)
            "#,
        )
        .bind(permission_id.as_uuid())
        .bind(codes)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("select_predefined_by_permission", e))?;

        rows.iter()
            .map(|r| role_from_row("select_predefined_by_permission", r))
            .collect()
    }
}

#[async_trait]
impl RolePermissionStore for PostgresCatalog {
    async fn link_exists(&self, link: RolePermission) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM iam_role_permission WHERE role_id = $1 AND permission_id = $2",
        )
        .bind(link.role_id.as_uuid())
        .bind(link.permission_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("link_exists", e))?;

        Ok(row.is_some())
    }

    async fn insert_link(&self, link: RolePermission) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO iam_role_permission (role_id, permission_id) VALUES ($1, $2)")
            .bind(link.role_id.as_uuid())
            .bind(link.permission_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_link", e))?;
        Ok(())
    }

    async fn delete_link(&self, link: RolePermission) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM iam_role_permission WHERE role_id = $1 AND permission_id = $2")
                .bind(link.role_id.as_uuid())
                .bind(link.permission_id.as_uuid())
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("delete_link", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23503") => StoreError::NotFound(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
