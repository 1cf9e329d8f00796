//! `permsync-catalog` — pure permission-catalog model and document parsing.
//!
//! This crate is intentionally decoupled from HTTP and storage: it turns an API
//! description document into declarations and decides which role links a
//! permission should carry. Applying those decisions is the infra crate's job.

pub mod directory;
pub mod extract;
pub mod metadata;
pub mod permission;
pub mod role;
pub mod role_sync;

pub use directory::RoleDirectory;
pub use extract::{
    DocumentError, EndpointDeclaration, Extraction, extract_endpoints, parse_document,
    resource_code_from_tags,
};
pub use metadata::{MetadataDecode, PermissionDeclaration, decode_metadata};
pub use permission::{Permission, PermissionCode, PermissionDraft};
pub use role::{PredefinedRoles, Role, RoleCode, RolePermission, init_role};
pub use role_sync::{RoleSyncPlan, plan};
