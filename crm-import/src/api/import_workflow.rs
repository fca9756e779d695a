//! Import workflow API handlers
//!
//! POST /import/select/:target, GET /import/status/:session_id,
//! PUT /import/:session_id/configuration, POST /import/:session_id/{cancel,commit,retry},
//! DELETE /import/:session_id, GET /import/template/:target

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use crm_common::events::ImportCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        FailedRow, ImportConfiguration, ImportPhase, ImportSession, ImportSummary, ImportTarget,
        RawRecord, SourceFile,
    },
    services::template_csv,
    AppState,
};

/// POST /import/select/:target request
#[derive(Debug, Deserialize)]
pub struct SelectFileRequest {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// File contents; JSON strings are always valid UTF-8
    pub content: String,
}

/// Preview of a PREVIEWING session
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub session_id: Uuid,
    pub target: ImportTarget,
    pub phase: ImportPhase,
    pub file_name: String,
    pub headers: Vec<String>,
    pub record_count: usize,
    pub rows: Vec<RawRecord>,
    pub configuration: ImportConfiguration,
}

impl PreviewResponse {
    fn from_session(session: &ImportSession) -> Option<Self> {
        let file = session.preview()?;
        Some(Self {
            session_id: session.session_id(),
            target: session.target(),
            phase: session.phase(),
            file_name: session
                .source()
                .map(|s| s.file_name.clone())
                .unwrap_or_default(),
            headers: file.headers().to_vec(),
            record_count: file.len(),
            rows: file.records().to_vec(),
            configuration: session.configuration().cloned().unwrap_or_default(),
        })
    }
}

/// GET /import/status/:session_id response
#[derive(Debug, Serialize)]
pub struct ImportStatusResponse {
    pub session_id: Uuid,
    pub target: ImportTarget,
    pub phase: ImportPhase,
    pub file_name: Option<String>,
    pub record_count: Option<usize>,
    pub progress: ImportCounts,
    pub percentage: f32,
    pub configuration: Option<ImportConfiguration>,
    pub summary: Option<ImportSummary>,
    pub failed_rows: Vec<FailedRow>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ImportStatusResponse {
    fn from_session(session: &ImportSession) -> Self {
        let progress = session.progress();
        Self {
            session_id: session.session_id(),
            target: session.target(),
            phase: session.phase(),
            file_name: session.source().map(|s| s.file_name.clone()),
            record_count: session.preview().map(|f| f.len()),
            progress,
            percentage: progress.percentage(),
            configuration: session.configuration().cloned(),
            summary: session.summary().cloned(),
            failed_rows: session.failed_rows().to_vec(),
            created_at: session.created_at(),
        }
    }
}

/// PUT /import/:session_id/configuration request
#[derive(Debug, Deserialize)]
pub struct ConfigurationRequest {
    pub values: BTreeMap<String, String>,
}

/// Response for cancel and commit
#[derive(Debug, Serialize)]
pub struct PhaseResponse {
    pub session_id: Uuid,
    pub phase: ImportPhase,
    pub progress: ImportCounts,
}

fn parse_target(raw: &str) -> ApiResult<ImportTarget> {
    raw.parse().map_err(ApiError::BadRequest)
}

fn preview_of(state: &AppState, session_id: Uuid) -> ApiResult<Json<PreviewResponse>> {
    state
        .orchestrator
        .registry()
        .with(session_id, PreviewResponse::from_session)?
        .map(Json)
        .ok_or_else(|| ApiError::Internal(format!("Session {} has no preview", session_id)))
}

fn phase_of(state: &AppState, session_id: Uuid) -> ApiResult<Json<PhaseResponse>> {
    let response = state.orchestrator.registry().with(session_id, |session| PhaseResponse {
        session_id,
        phase: session.phase(),
        progress: session.progress(),
    })?;
    Ok(Json(response))
}

/// POST /import/select/:target
///
/// Parse the uploaded file into a new PREVIEWING session. Rejected files
/// return 422 and create nothing.
pub async fn select_file(
    State(state): State<AppState>,
    Path(target): Path<String>,
    payload: Result<Json<SelectFileRequest>, JsonRejection>,
) -> ApiResult<Json<PreviewResponse>> {
    let target = parse_target(&target)?;
    let Json(request) = payload?;
    let source = SourceFile {
        file_name: request.file_name,
        content_type: request.content_type,
        size_bytes: request.content.len(),
    };

    let session_id = state
        .orchestrator
        .start_session(target, source, request.content.as_bytes())?;

    preview_of(&state, session_id)
}

/// GET /import/status/:session_id
pub async fn get_import_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<ImportStatusResponse>> {
    let response = state
        .orchestrator
        .registry()
        .with(session_id, ImportStatusResponse::from_session)?;

    tracing::debug!(session_id = %session_id, phase = %response.phase, "Status query");
    Ok(Json(response))
}

/// PUT /import/:session_id/configuration
pub async fn update_configuration(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    payload: Result<Json<ConfigurationRequest>, JsonRejection>,
) -> ApiResult<Json<PreviewResponse>> {
    let Json(request) = payload?;
    state
        .orchestrator
        .configure(session_id, ImportConfiguration::from_values(request.values))?;
    preview_of(&state, session_id)
}

/// POST /import/:session_id/cancel
///
/// Back to SELECTING from a preview; during a commit, stop before the next
/// row. A cancelled preview is discarded: the next upload starts a new
/// session.
pub async fn cancel_import(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PhaseResponse>> {
    match state.orchestrator.cancel(session_id)? {
        ImportPhase::Selecting => {
            state.orchestrator.discard(session_id)?;
            Ok(Json(PhaseResponse {
                session_id,
                phase: ImportPhase::Selecting,
                progress: ImportCounts::default(),
            }))
        }
        _ => phase_of(&state, session_id),
    }
}

/// DELETE /import/:session_id
///
/// Drop a session that is not committing. Returns 204 No Content.
pub async fn discard_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.orchestrator.discard(session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /import/:session_id/commit
///
/// Start submitting rows on a background task. Returns 202 Accepted.
pub async fn commit_import(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<PhaseResponse>)> {
    let handle = state.orchestrator.commit(session_id)?;
    let response = phase_of(&state, session_id)?;

    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        match handle.await {
            Ok(counts) if counts.errors > 0 => {
                *last_error.write().await = Some(format!(
                    "Import {}: {} of {} rows failed",
                    session_id, counts.errors, counts.total
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Commit task failed");
                *last_error.write().await = Some(format!("Import {}: commit task failed", session_id));
            }
        }
    });

    Ok((StatusCode::ACCEPTED, response))
}

/// POST /import/:session_id/retry
///
/// New PREVIEWING session holding the failed rows of a DONE session.
pub async fn retry_failed(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<PreviewResponse>> {
    let retry_id = state.orchestrator.retry_failed(session_id)?;
    preview_of(&state, retry_id)
}

/// GET /import/template/:target
pub async fn download_template(Path(target): Path<String>) -> ApiResult<Response> {
    let target = parse_target(&target)?;
    let bytes = template_csv(target).map_err(|e| ApiError::Internal(e.to_string()))?;
    let body = String::from_utf8(bytes).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(super::csv_attachment(target.template_file_name(), body))
}

/// Build import workflow routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import/select/:target", post(select_file))
        .route("/import/status/:session_id", get(get_import_status))
        .route("/import/template/:target", get(download_template))
        .route(
            "/import/:session_id/configuration",
            put(update_configuration),
        )
        .route("/import/:session_id/cancel", post(cancel_import))
        .route("/import/:session_id/commit", post(commit_import))
        .route("/import/:session_id/retry", post(retry_failed))
        .route("/import/:session_id", delete(discard_session))
}
