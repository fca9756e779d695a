//! Import orchestrator
//!
//! Drives sessions through their lifecycle:
//! SELECTING → PREVIEWING → COMMITTING → DONE
//!
//! Every phase change goes through [`ImportSession::apply`] and is published
//! on the event bus. The commit runs as one background task per session;
//! that task is the only writer of the session's progress while it runs.
//!
//! Sessions are held in memory only. Any session that is not committing is
//! evicted once it has been idle longer than the retention period; the
//! sweep runs whenever a new session starts.

use super::batch_submitter::{BatchSubmitter, MappedRow, ProgressObserver};
use super::field_mapper::FieldMapper;
use super::mappings::mapping_for;
use super::record_store::RecordStore;
use super::session_registry::SessionRegistry;
use super::tabular_parser::TabularParser;
use crate::error::ImportError;
use crate::models::{
    CommitPlan, ImportConfiguration, ImportPhase, ImportSession, ImportTarget, SessionError,
    SessionEvent, SourceFile, StateTransition, SubmissionOutcome,
};
use chrono::{DateTime, Duration, Utc};
use crm_common::events::{CrmEvent, EventBus, ImportCounts};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Idle time after which a finished or abandoned session is evicted
pub const DEFAULT_SESSION_RETENTION_SECONDS: u64 = 3600;

/// Import orchestrator service
#[derive(Clone)]
pub struct ImportOrchestrator {
    registry: SessionRegistry,
    event_bus: EventBus,
    submitter: BatchSubmitter,
    parser: TabularParser,
    retention: Duration,
}

impl ImportOrchestrator {
    pub fn new(event_bus: EventBus, store: Arc<dyn RecordStore>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            event_bus,
            submitter: BatchSubmitter::new(store),
            parser: TabularParser::new(),
            retention: Duration::seconds(DEFAULT_SESSION_RETENTION_SECONDS as i64),
        }
    }

    pub fn with_retention(mut self, retention: std::time::Duration) -> Self {
        self.retention = Duration::from_std(retention).unwrap_or(Duration::MAX);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Register a new session in SELECTING
    pub fn create_session(&self, target: ImportTarget) -> Uuid {
        let session_id = self.registry.insert(ImportSession::new(target));
        tracing::info!(session_id = %session_id, target = %target, "Import session created");
        session_id
    }

    /// Create a session and select a file in one step
    ///
    /// Nothing is registered when the file is rejected.
    pub fn start_session(
        &self,
        target: ImportTarget,
        source: SourceFile,
        contents: &[u8],
    ) -> Result<Uuid, ImportError> {
        self.evict_expired(Utc::now());
        let session_id = self.create_session(target);
        if let Err(e) = self.select_file(session_id, source, contents) {
            self.registry.remove(session_id);
            return Err(e);
        }
        Ok(session_id)
    }

    /// SELECTING → PREVIEWING
    ///
    /// On a parse error the session stays in SELECTING.
    pub fn select_file(
        &self,
        session_id: Uuid,
        source: SourceFile,
        contents: &[u8],
    ) -> Result<(), ImportError> {
        let parsed = TabularParser::accept(&source.file_name, source.content_type.as_deref())
            .and_then(|_| self.parser.parse(contents));
        let file = match parsed {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    file_name = %source.file_name,
                    error = %e,
                    "File rejected"
                );
                return Err(e.into());
            }
        };

        let file_name = source.file_name.clone();
        let record_count = file.len();
        let (applied, target) = self.registry.with_mut(session_id, |session| {
            session
                .apply(SessionEvent::FileParsed { source, file })
                .map(|applied| (applied, session.target()))
        })??;

        self.publish(applied.transition);
        self.event_bus.emit_lossy(CrmEvent::ImportSessionStarted {
            session_id,
            target: target.to_string(),
            file_name,
            record_count,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Replace the configuration of a PREVIEWING session
    ///
    /// Only fields the target's mapping declares configurable are accepted.
    pub fn configure(
        &self,
        session_id: Uuid,
        configuration: ImportConfiguration,
    ) -> Result<(), ImportError> {
        self.registry.with_mut(session_id, |session| {
            let mapping = mapping_for(session.target());
            if let Some(unknown) = configuration
                .fields()
                .find(|f| !mapping.rule(f).is_some_and(|r| r.is_configurable()))
            {
                return Err(SessionError::UnknownConfigurationField {
                    target: session.target(),
                    field: unknown.to_string(),
                });
            }
            session.apply(SessionEvent::Configure(configuration)).map(|_| ())
        })??;
        tracing::debug!(session_id = %session_id, "Import configuration updated");
        Ok(())
    }

    /// PREVIEWING → SELECTING, or stop a running commit before its next row
    ///
    /// Returns the phase after the call.
    pub fn cancel(&self, session_id: Uuid) -> Result<ImportPhase, ImportError> {
        let (transition, phase) = self.registry.with_mut(session_id, |session| {
            let transition = if session.phase() == ImportPhase::Committing {
                session.request_cancel()?;
                tracing::info!(session_id = %session_id, "Commit cancellation requested");
                None
            } else {
                session.apply(SessionEvent::Cancel)?.transition
            };
            Ok::<_, SessionError>((transition, session.phase()))
        })??;
        self.publish(transition);
        Ok(phase)
    }

    /// Drop a session that is not committing
    pub fn discard(&self, session_id: Uuid) -> Result<(), ImportError> {
        self.registry.with(session_id, |session| match session.phase() {
            ImportPhase::Committing => Err(SessionError::InvalidTransition {
                phase: ImportPhase::Committing,
                event: "Discard",
            }),
            _ => Ok(()),
        })??;
        self.registry.remove(session_id);
        tracing::info!(session_id = %session_id, "Import session discarded");
        Ok(())
    }

    /// Evict sessions idle since before `now - retention`; committing
    /// sessions are never evicted
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let evicted = self.registry.evict(|session| {
            let last_activity = session
                .summary()
                .map(|s| s.finished_at)
                .unwrap_or_else(|| session.created_at());
            session.phase() != ImportPhase::Committing && last_activity < cutoff
        });
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.registry.len(), "Expired import sessions evicted");
        }
        evicted
    }

    /// PREVIEWING → COMMITTING; returns the work for the commit task
    pub fn start_commit(&self, session_id: Uuid) -> Result<CommitPlan, ImportError> {
        let applied = self
            .registry
            .with_mut(session_id, |session| session.apply(SessionEvent::Confirm))??;
        self.publish(applied.transition);
        applied.commit.ok_or_else(|| {
            ImportError::Session(SessionError::InvalidTransition {
                phase: ImportPhase::Committing,
                event: "Confirm",
            })
        })
    }

    /// Start the commit and run it on a background task
    pub fn commit(&self, session_id: Uuid) -> Result<JoinHandle<ImportCounts>, ImportError> {
        let plan = self.start_commit(session_id)?;
        let orchestrator = self.clone();
        Ok(tokio::spawn(async move { orchestrator.run_commit(plan).await }))
    }

    /// Submit every record of `plan`; the session reaches DONE when this returns
    pub async fn run_commit(&self, plan: CommitPlan) -> ImportCounts {
        let total = plan.total();
        let CommitPlan {
            session_id,
            target,
            file_name,
            records,
            configuration,
            cancel,
        } = plan;

        tracing::info!(
            session_id = %session_id,
            target = %target,
            file_name = %file_name,
            total,
            "Commit started"
        );

        let mapper = FieldMapper::new(mapping_for(target), configuration);
        let rows = records.into_iter().enumerate().map(|(i, raw)| {
            let record = mapper.map(&raw);
            MappedRow {
                row_number: i + 1,
                raw,
                record,
            }
        });

        let observer = (
            SessionProgress {
                orchestrator: self.clone(),
                session_id,
            },
            EventProgress {
                event_bus: self.event_bus.clone(),
                session_id,
                target,
                started: Instant::now(),
            },
        );

        let outcome = self.submitter.submit(total, rows, &observer, &cancel).await;

        tracing::info!(
            session_id = %session_id,
            processed = outcome.counts.processed,
            total = outcome.counts.total,
            errors = outcome.counts.errors,
            cancelled = outcome.cancelled,
            "Commit finished"
        );
        outcome.counts
    }

    /// New PREVIEWING session holding the failed rows of a DONE session
    pub fn retry_failed(&self, session_id: Uuid) -> Result<Uuid, ImportError> {
        let (session, transition) = self
            .registry
            .with(session_id, |session| session.retry_failed())??;

        let retry_id = session.session_id();
        let target = session.target();
        let record_count = session.preview().map(|f| f.len()).unwrap_or(0);
        let file_name = session
            .source()
            .map(|s| s.file_name.clone())
            .unwrap_or_default();
        self.registry.insert(session);

        tracing::info!(
            session_id = %retry_id,
            retry_of = %session_id,
            record_count,
            "Retry session created from failed rows"
        );
        self.publish(Some(transition));
        self.event_bus.emit_lossy(CrmEvent::ImportSessionStarted {
            session_id: retry_id,
            target: target.to_string(),
            file_name,
            record_count,
            timestamp: Utc::now(),
        });
        Ok(retry_id)
    }

    fn publish(&self, transition: Option<StateTransition>) {
        let Some(transition) = transition else {
            return;
        };
        tracing::info!(
            session_id = %transition.session_id,
            old_phase = %transition.old_phase,
            new_phase = %transition.new_phase,
            "Import phase changed"
        );
        self.event_bus.emit_lossy(CrmEvent::ImportPhaseChanged {
            session_id: transition.session_id,
            old_phase: transition.old_phase.to_string(),
            new_phase: transition.new_phase.to_string(),
            timestamp: transition.transitioned_at,
        });
    }
}

/// Writes progress into the session and moves it to DONE on completion
struct SessionProgress {
    orchestrator: ImportOrchestrator,
    session_id: Uuid,
}

impl SessionProgress {
    fn apply(&self, event: SessionEvent) -> Option<StateTransition> {
        let result = self
            .orchestrator
            .registry
            .with_mut(self.session_id, |session| session.apply(event));
        match result {
            Ok(Ok(applied)) => applied.transition,
            Ok(Err(e)) | Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "Session rejected commit update");
                None
            }
        }
    }
}

impl ProgressObserver for SessionProgress {
    fn on_progress(&self, counts: ImportCounts) {
        self.apply(SessionEvent::Progress(counts));
    }

    fn on_complete(&self, outcome: &SubmissionOutcome) {
        let transition = self.apply(SessionEvent::Completed(outcome.clone()));
        self.orchestrator.publish(transition);
    }
}

/// Publishes progress and completion on the event bus
struct EventProgress {
    event_bus: EventBus,
    session_id: Uuid,
    target: ImportTarget,
    started: Instant,
}

impl ProgressObserver for EventProgress {
    fn on_progress(&self, counts: ImportCounts) {
        self.event_bus.emit_lossy(CrmEvent::ImportProgressUpdate {
            session_id: self.session_id,
            target: self.target.to_string(),
            counts,
            percentage: counts.percentage(),
            timestamp: Utc::now(),
        });
    }

    fn on_complete(&self, outcome: &SubmissionOutcome) {
        self.event_bus.emit_lossy(CrmEvent::ImportSessionCompleted {
            session_id: self.session_id,
            target: self.target.to_string(),
            counts: outcome.counts,
            cancelled: outcome.cancelled,
            duration_seconds: self.started.elapsed().as_secs(),
            timestamp: Utc::now(),
        });
    }
}
