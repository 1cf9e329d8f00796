//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, fetcher, engine and registry feed wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/v1", routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
