//! Synchronization triggers.

use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use permsync_events::{EventBus, InstanceEvent};

use crate::app::dto::InstanceUpRequest;
use crate::app::errors;
use crate::app::services::AppServices;

/// POST /v1/sync
///
/// Run a synchronization inline and return its report.
pub async fn sync(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<InstanceUpRequest>,
) -> axum::response::Response {
    let event = InstanceEvent::from(req);
    match services.engine.sync(&event).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::sync_error_to_response(e),
    }
}

/// POST /v1/events
///
/// Hand an announcement to the registry feed; the run happens in the
/// background.
pub async fn publish_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<InstanceUpRequest>,
) -> axum::response::Response {
    let event = InstanceEvent::from(req);
    let event_id = event.event_id;

    match services.bus.publish(event) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "event_id": event_id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "publish_error",
            format!("{e:?}"),
        ),
    }
}

/// POST /v1/sweep
///
/// Remove level-mismatched role links. A sweep already in flight makes this
/// one report `skipped: true`.
pub async fn sweep(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.engine.sweep().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}
