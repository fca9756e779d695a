//! Event types for the CRM event system
//!
//! Provides shared event definitions and EventBus for all CRM services.

mod import_types;

pub use import_types::ImportCounts;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// CRM event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrmEvent {
    /// A file was parsed and a new import session is previewing it
    ///
    /// Triggers:
    /// - SSE: Show preview table and record count
    ImportSessionStarted {
        /// Import session UUID
        session_id: Uuid,
        /// Target record type ("customer", "lead")
        target: String,
        /// Name of the uploaded file
        file_name: String,
        /// Number of non-empty rows found
        record_count: usize,
        /// When session started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session moved between lifecycle phases
    ///
    /// Triggers:
    /// - SSE: Update stepper display
    ImportPhaseChanged {
        /// Import session UUID
        session_id: Uuid,
        /// Phase before the transition
        old_phase: String,
        /// Phase after the transition
        new_phase: String,
        /// When the transition happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One row finished submitting (successfully or not)
    ///
    /// Emitted once per row, in row order, while committing.
    ///
    /// Triggers:
    /// - SSE: Update progress bar and error counter
    ImportProgressUpdate {
        /// Import session UUID
        session_id: Uuid,
        /// Target record type
        target: String,
        /// Row counters after this row
        counts: ImportCounts,
        /// Progress percentage (0.0-100.0)
        percentage: f32,
        /// When progress updated
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Commit finished (all rows submitted, or cancelled between rows)
    ///
    /// Triggers:
    /// - SSE: Show completion summary
    ImportSessionCompleted {
        /// Import session UUID
        session_id: Uuid,
        /// Target record type
        target: String,
        /// Final row counters
        counts: ImportCounts,
        /// Whether the commit stopped early on user request
        cancelled: bool,
        /// Commit duration in seconds
        duration_seconds: u64,
        /// When session completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CrmEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CrmEvent::ImportSessionStarted { .. } => "ImportSessionStarted",
            CrmEvent::ImportPhaseChanged { .. } => "ImportPhaseChanged",
            CrmEvent::ImportProgressUpdate { .. } => "ImportProgressUpdate",
            CrmEvent::ImportSessionCompleted { .. } => "ImportSessionCompleted",
        }
    }

    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            CrmEvent::ImportSessionStarted { session_id, .. }
            | CrmEvent::ImportPhaseChanged { session_id, .. }
            | CrmEvent::ImportProgressUpdate { session_id, .. }
            | CrmEvent::ImportSessionCompleted { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use crm_common::events::{CrmEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(CrmEvent::ImportPhaseChanged {
///     session_id: uuid::Uuid::new_v4(),
///     old_phase: "PREVIEWING".to_string(),
///     new_phase: "COMMITTING".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CrmEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before
    /// the oldest ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CrmEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events use this: an import must never stall because nobody
    /// is watching it.
    pub fn emit_lossy(&self, event: CrmEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event(session_id: Uuid, processed: usize) -> CrmEvent {
        let counts = ImportCounts { processed, total: 3, errors: 0 };
        CrmEvent::ImportProgressUpdate {
            session_id,
            target: "customer".to_string(),
            counts,
            percentage: counts.percentage(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(10);
        bus.emit_lossy(progress_event(Uuid::new_v4(), 1));

        // Late subscribers do not see earlier events
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        for processed in 1..=3 {
            bus.emit_lossy(progress_event(session_id, processed));
        }

        for expected in 1..=3 {
            match rx.recv().await.unwrap() {
                CrmEvent::ImportProgressUpdate { counts, .. } => {
                    assert_eq!(counts.processed, expected)
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let session_id = Uuid::new_v4();
        let json = serde_json::to_value(progress_event(session_id, 2)).unwrap();
        assert_eq!(json["type"], "ImportProgressUpdate");
        assert_eq!(json["counts"]["processed"], 2);
        assert_eq!(json["session_id"], session_id.to_string());
    }

    #[test]
    fn test_event_type_and_session_id() {
        let session_id = Uuid::new_v4();
        let event = progress_event(session_id, 1);
        assert_eq!(event.event_type(), "ImportProgressUpdate");
        assert_eq!(event.session_id(), session_id);
    }
}
