//! Server-Sent Events (SSE) for import progress streaming

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Optional filter for `/import/events`
#[derive(Debug, Default, Deserialize)]
pub struct ImportEventFilter {
    /// Only forward events of this session
    pub session_id: Option<Uuid>,
}

/// GET /import/events - SSE event stream for import progress
///
/// Streams events:
/// - ImportSessionStarted
/// - ImportPhaseChanged
/// - ImportProgressUpdate (one per submitted row)
/// - ImportSessionCompleted
pub async fn import_event_stream(
    State(state): State<AppState>,
    Query(filter): Query<ImportEventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_filter = ?filter.session_id, "New SSE client connected to import events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(crm_common::sse::HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(event) => {
                        if filter.session_id.is_some_and(|id| id != event.session_id()) {
                            continue;
                        }
                        let event_type = event.event_type().to_string();
                        match serde_json::to_string(&event) {
                            Ok(event_json) => {
                                debug!("SSE: Broadcasting import event: {}", event_type);
                                yield Ok(Event::default().event(event_type).data(event_json));
                            }
                            Err(e) => {
                                warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE: Client lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    };

    Sse::new(stream).keep_alive(crm_common::sse::keep_alive())
}

/// GET /events - general connection status stream
pub async fn event_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    crm_common::sse::create_heartbeat_sse_stream("crm-import")
}
