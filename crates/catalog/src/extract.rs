//! Endpoint extraction from a service's API description document.
//!
//! The document is the usual swagger shape:
//!
//! ```text
//! { "paths": { "/v1/users": { "post": { "tags": [...], "summary": "...", "description": "..." } } } }
//! ```
//!
//! Only endpoints tagged after a governed controller (`<resource>-controller`)
//! or an internal endpoint (`<resource>-endpoint`) become declarations.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const CONTROLLER_SUFFIX: &str = "-controller";
pub const ENDPOINT_SUFFIX: &str = "-endpoint";

/// Document-level failure. Fatal for a synchronization run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document is not valid json: {0}")]
    Json(String),

    #[error("document has no 'paths' object")]
    MissingPaths,
}

/// One qualifying `(path, method)` of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDeclaration {
    pub path: String,
    pub method: String,
    pub tags: Vec<String>,
    pub resource_code: String,
    pub summary: String,
    /// Raw `description` node, holding the serialized metadata envelope.
    pub description: Option<JsonValue>,
}

/// Result of walking a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub endpoints: Vec<EndpointDeclaration>,
    /// Endpoints dropped because no tag followed the naming convention.
    pub illegal: usize,
}

/// Parse a raw document body.
pub fn parse_document(body: &str) -> Result<JsonValue, DocumentError> {
    serde_json::from_str(body).map_err(|e| DocumentError::Json(e.to_string()))
}

/// Derive the resource code from an endpoint's tags.
///
/// Every matching tag overwrites the previous one, so the *last* match in
/// document order wins.
pub fn resource_code_from_tags<'a, I>(tags: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut resource_code = None;
    for tag in tags {
        let stripped = tag
            .strip_suffix(CONTROLLER_SUFFIX)
            .or_else(|| tag.strip_suffix(ENDPOINT_SUFFIX));
        if let Some(code) = stripped.filter(|c| !c.is_empty()) {
            resource_code = Some(code.to_string());
        }
    }
    resource_code
}

/// Walk `paths` and yield one declaration per qualifying `(path, method)`.
pub fn extract_endpoints(document: &JsonValue) -> Result<Extraction, DocumentError> {
    let paths = document
        .get("paths")
        .and_then(JsonValue::as_object)
        .ok_or(DocumentError::MissingPaths)?;

    let mut extraction = Extraction::default();

    for (path, methods) in paths {
        let Some(methods) = methods.as_object() else {
            continue;
        };

        for (method, operation) in methods {
            if !operation.is_object() {
                continue;
            }

            let tags: Vec<String> = operation
                .get("tags")
                .and_then(JsonValue::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();

            let Some(resource_code) = resource_code_from_tags(tags.iter().map(String::as_str))
            else {
                debug!(
                    path = %path,
                    method = %method,
                    tags = ?tags,
                    "skip endpoint with illegal tags, controller tags must end with -controller or -endpoint"
                );
                extraction.illegal += 1;
                continue;
            };

            let summary = operation
                .get("summary")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();

            extraction.endpoints.push(EndpointDeclaration {
                path: path.clone(),
                method: method.clone(),
                tags,
                resource_code,
                summary,
                description: operation.get("description").cloned(),
            });
        }
    }

    Ok(extraction)
}
