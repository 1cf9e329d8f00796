//! Infrastructure layer: catalog stores, document fetching, configuration,
//! and the synchronization engine that ties them together.

pub mod config;
pub mod fetch;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod workers;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use fetch::{DocumentFetcher, FetchError, HttpDocumentFetcher};
pub use sync::{EndpointOutcome, SyncEngine, SyncError, SyncReport};
