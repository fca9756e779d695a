//! crm-import library interface
//!
//! Bulk record import pipeline: parse an uploaded CSV, map each row to a
//! customer or lead record, and submit rows one at a time to the CRM.
//! Exposes the HTTP router and services for the binary and for tests.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult, ImportError};

use axum::Router;
use chrono::{DateTime, Utc};
use crm_common::events::EventBus;
use services::{ImportOrchestrator, RecordStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Session lifecycle and commit driver
    pub orchestrator: ImportOrchestrator,
    /// Remote record store (also used directly for export listings)
    pub store: Arc<dyn RecordStore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(event_bus: EventBus, store: Arc<dyn RecordStore>) -> Self {
        Self {
            orchestrator: ImportOrchestrator::new(event_bus.clone(), store.clone()),
            event_bus,
            store,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Idle time after which finished or abandoned sessions are evicted
    pub fn with_session_retention(mut self, retention: std::time::Duration) -> Self {
        self.orchestrator = self.orchestrator.with_retention(retention);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::import_routes())
        .merge(api::export_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .route("/import/events", get(api::import_event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
