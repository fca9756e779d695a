//! Server-Sent Events (SSE) utilities
//!
//! Shared SSE implementations for CRM services.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between heartbeat comments on every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Keep-alive settings shared by all SSE endpoints
pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat")
}

/// Create a simple heartbeat-only SSE stream for connection status monitoring
///
/// Used for the general `/events` endpoint, which has no domain events of its
/// own but lets a UI show whether the service is reachable.
///
/// # Example
/// ```rust,ignore
/// pub async fn event_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
///     crm_common::sse::create_heartbeat_sse_stream("crm-import")
/// }
/// ```
pub fn create_heartbeat_sse_stream(
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} general events", service_name);

    let stream = async_stream::stream! {
        info!("SSE: {} event stream started", service_name);

        // Send initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            debug!("SSE: Sending heartbeat");
            yield Ok(Event::default().comment("heartbeat"));
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
