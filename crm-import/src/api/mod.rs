//! HTTP API handlers for crm-import
//!
//! REST endpoints for the import lifecycle, templates and export, plus SSE
//! streams for progress.

pub mod export;
pub mod health;
pub mod import_workflow;
pub mod sse;

pub use export::export_routes;
pub use health::health_routes;
pub use import_workflow::import_routes;
pub use sse::{event_stream, import_event_stream};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// CSV body served as a file download
pub(crate) fn csv_attachment(file_name: &str, body: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body.into(),
    )
        .into_response()
}
