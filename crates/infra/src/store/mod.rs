//! Persistent permission catalog boundary.
//!
//! The sync engine only consumes this contract; the catalog itself (roles in
//! particular) is owned and provisioned elsewhere.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryCatalog;
pub use postgres::PostgresCatalog;
pub use r#trait::{CatalogStore, PermissionStore, RolePermissionStore, RoleStore, StoreError};
