//! `permsync-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the catalog and
//! infrastructure crates (no IO, no storage assumptions).

pub mod error;
pub mod id;
pub mod level;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId};
pub use level::ResourceLevel;
pub use version::ObjectVersion;
