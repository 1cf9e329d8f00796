use axum::{Router, routing::post};

pub mod sync;
pub mod system;

/// Router for the synchronization endpoints (mounted under `/v1`).
pub fn router() -> Router {
    Router::new()
        .route("/sync", post(sync::sync))
        .route("/events", post(sync::publish_event))
        .route("/sweep", post(sync::sweep))
}
