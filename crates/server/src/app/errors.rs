use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use permsync_infra::SyncError;

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::InvalidTrigger(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_trigger", msg),
        SyncError::Fetch(e) => json_error(StatusCode::BAD_GATEWAY, "fetch_error", e.to_string()),
        e @ SyncError::Document { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "document_error", e.to_string())
        }
        SyncError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
