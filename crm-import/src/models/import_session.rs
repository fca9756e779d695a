//! Import session state machine
//!
//! A session moves SELECTING → PREVIEWING → COMMITTING → DONE, with
//! PREVIEWING → SELECTING as the only backward edge (cancel). Every change
//! goes through [`ImportSession::apply`]; each phase variant carries exactly
//! the data that is valid in that phase, so a commit without records or a
//! Done session without a summary cannot be represented.

use super::import_result::{FailedRow, ImportSummary, SubmissionOutcome};
use super::raw_record::{ParsedFile, RawRecord};
use super::target::ImportTarget;
use chrono::{DateTime, Utc};
use crm_common::events::ImportCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Session lifecycle phase, as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportPhase {
    /// Waiting for a file
    Selecting,
    /// File parsed; records and configuration visible for review
    Previewing,
    /// Rows being submitted one at a time
    Committing,
    /// Commit finished; summary is read-only
    Done,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Selecting => "SELECTING",
            ImportPhase::Previewing => "PREVIEWING",
            ImportPhase::Committing => "COMMITTING",
            ImportPhase::Done => "DONE",
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase change record, published on the event bus
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_phase: ImportPhase,
    pub new_phase: ImportPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// Session errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Event arrived in a phase that does not accept it
    #[error("{event} is not allowed while the session is {phase}")]
    InvalidTransition {
        phase: ImportPhase,
        event: &'static str,
    },

    /// Progress report that would break the counter invariants
    #[error("Inconsistent progress report: {0}")]
    InconsistentProgress(String),

    #[error("Session has no failed rows to retry")]
    NothingToRetry,

    #[error("'{field}' is not a configurable field for {target} imports")]
    UnknownConfigurationField { target: ImportTarget, field: String },

    #[error("Import session not found: {0}")]
    NotFound(Uuid),
}

/// User-supplied default values, keyed by target field name
///
/// Values for the mapping's configurable fields (`owner`, `group` for
/// leads). Blank values are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportConfiguration {
    values: BTreeMap<String, String>,
}

impl ImportConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Trimmed value for `field`, or None when unset or blank
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Identity of the uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: usize,
}

/// Inputs to the session state machine
#[derive(Debug)]
pub enum SessionEvent {
    /// File parsed into a non-empty record set
    FileParsed { source: SourceFile, file: ParsedFile },
    /// Replace the configuration (PREVIEWING only)
    Configure(ImportConfiguration),
    /// Back out of the preview, discarding records and configuration
    Cancel,
    /// Start the commit; freezes the total
    Confirm,
    /// Snapshot after one more row was submitted
    Progress(ImportCounts),
    /// Submitter completion signal
    Completed(SubmissionOutcome),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::FileParsed { .. } => "FileParsed",
            SessionEvent::Configure(_) => "Configure",
            SessionEvent::Cancel => "Cancel",
            SessionEvent::Confirm => "Confirm",
            SessionEvent::Progress(_) => "Progress",
            SessionEvent::Completed(_) => "Completed",
        }
    }
}

/// Work handed to the commit task by the PREVIEWING → COMMITTING transition
#[derive(Debug)]
pub struct CommitPlan {
    pub session_id: Uuid,
    pub target: ImportTarget,
    pub file_name: String,
    pub records: Vec<RawRecord>,
    pub configuration: ImportConfiguration,
    /// Checked between rows
    pub cancel: CancellationToken,
}

impl CommitPlan {
    pub fn total(&self) -> usize {
        self.records.len()
    }
}

/// Result of applying one event
#[derive(Debug, Default)]
pub struct Applied {
    /// Set when the phase changed
    pub transition: Option<StateTransition>,
    /// Set by Confirm
    pub commit: Option<CommitPlan>,
}

#[derive(Debug)]
enum Phase {
    Selecting,
    Previewing {
        source: SourceFile,
        file: ParsedFile,
        configuration: ImportConfiguration,
    },
    Committing {
        source: SourceFile,
        headers: Vec<String>,
        configuration: ImportConfiguration,
        progress: ImportCounts,
        cancel: CancellationToken,
        started_at: DateTime<Utc>,
    },
    Done {
        source: SourceFile,
        headers: Vec<String>,
        configuration: ImportConfiguration,
        summary: ImportSummary,
        failed_rows: Vec<FailedRow>,
    },
}

impl Phase {
    fn kind(&self) -> ImportPhase {
        match self {
            Phase::Selecting => ImportPhase::Selecting,
            Phase::Previewing { .. } => ImportPhase::Previewing,
            Phase::Committing { .. } => ImportPhase::Committing,
            Phase::Done { .. } => ImportPhase::Done,
        }
    }
}

/// One import run, from file selection to commit completion
#[derive(Debug)]
pub struct ImportSession {
    session_id: Uuid,
    target: ImportTarget,
    created_at: DateTime<Utc>,
    phase: Phase,
}

impl ImportSession {
    /// Create new session in SELECTING
    pub fn new(target: ImportTarget) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target,
            created_at: Utc::now(),
            phase: Phase::Selecting,
        }
    }

    /// Apply one event
    ///
    /// Out-of-order events leave the session untouched and return
    /// [`SessionError::InvalidTransition`]; inconsistent progress reports
    /// return [`SessionError::InconsistentProgress`].
    pub fn apply(&mut self, event: SessionEvent) -> Result<Applied, SessionError> {
        let from = self.phase.kind();
        let current = std::mem::replace(&mut self.phase, Phase::Selecting);

        match (current, event) {
            (Phase::Selecting, SessionEvent::FileParsed { source, file }) => {
                self.phase = Phase::Previewing {
                    source,
                    file,
                    configuration: ImportConfiguration::default(),
                };
                Ok(self.moved(from, None))
            }

            (Phase::Previewing { source, file, .. }, SessionEvent::Configure(configuration)) => {
                self.phase = Phase::Previewing {
                    source,
                    file,
                    configuration,
                };
                Ok(Applied::default())
            }

            (Phase::Previewing { .. }, SessionEvent::Cancel) => {
                // Records and configuration are dropped with the old phase
                self.phase = Phase::Selecting;
                Ok(self.moved(from, None))
            }

            (
                Phase::Previewing {
                    source,
                    file,
                    configuration,
                },
                SessionEvent::Confirm,
            ) => {
                let (headers, records) = file.into_parts();
                let cancel = CancellationToken::new();
                let plan = CommitPlan {
                    session_id: self.session_id,
                    target: self.target,
                    file_name: source.file_name.clone(),
                    configuration: configuration.clone(),
                    cancel: cancel.clone(),
                    records,
                };
                self.phase = Phase::Committing {
                    source,
                    headers,
                    configuration,
                    progress: ImportCounts {
                        processed: 0,
                        total: plan.total(),
                        errors: 0,
                    },
                    cancel,
                    started_at: Utc::now(),
                };
                Ok(self.moved(from, Some(plan)))
            }

            (
                Phase::Committing {
                    source,
                    headers,
                    configuration,
                    progress,
                    cancel,
                    started_at,
                },
                SessionEvent::Progress(counts),
            ) => {
                let checked = check_progress(&progress, &counts);
                self.phase = Phase::Committing {
                    source,
                    headers,
                    configuration,
                    progress: if checked.is_ok() { counts } else { progress },
                    cancel,
                    started_at,
                };
                checked.map(|_| Applied::default())
            }

            (
                Phase::Committing {
                    source,
                    headers,
                    configuration,
                    progress,
                    cancel,
                    started_at,
                },
                SessionEvent::Completed(outcome),
            ) => {
                if let Err(e) = check_completion(&progress, &outcome) {
                    self.phase = Phase::Committing {
                        source,
                        headers,
                        configuration,
                        progress,
                        cancel,
                        started_at,
                    };
                    return Err(e);
                }
                let summary = ImportSummary::from_outcome(&outcome, started_at);
                self.phase = Phase::Done {
                    source,
                    headers,
                    configuration,
                    summary,
                    failed_rows: outcome.failed_rows,
                };
                Ok(self.moved(from, None))
            }

            (current, event) => {
                self.phase = current;
                Err(SessionError::InvalidTransition {
                    phase: from,
                    event: event.name(),
                })
            }
        }
    }

    fn moved(&self, from: ImportPhase, commit: Option<CommitPlan>) -> Applied {
        Applied {
            transition: Some(StateTransition {
                session_id: self.session_id,
                old_phase: from,
                new_phase: self.phase.kind(),
                transitioned_at: Utc::now(),
            }),
            commit,
        }
    }

    /// Ask a committing session to stop before its next row
    pub fn request_cancel(&self) -> Result<(), SessionError> {
        match &self.phase {
            Phase::Committing { cancel, .. } => {
                cancel.cancel();
                Ok(())
            }
            other => Err(SessionError::InvalidTransition {
                phase: other.kind(),
                event: "RequestCancel",
            }),
        }
    }

    /// Seed a new PREVIEWING session holding only this session's failed rows
    ///
    /// The new session inherits target and configuration. Only DONE sessions
    /// with at least one failed row can be retried.
    pub fn retry_failed(&self) -> Result<(ImportSession, StateTransition), SessionError> {
        let Phase::Done {
            source,
            headers,
            configuration,
            failed_rows,
            ..
        } = &self.phase
        else {
            return Err(SessionError::InvalidTransition {
                phase: self.phase.kind(),
                event: "Retry",
            });
        };

        let records = failed_rows.iter().map(|row| row.raw.clone()).collect();
        let file = ParsedFile::from_records(headers.clone(), records)
            .ok_or(SessionError::NothingToRetry)?;

        let mut retry = ImportSession::new(self.target);
        let source = SourceFile {
            file_name: format!("{} (failed rows)", source.file_name),
            content_type: source.content_type.clone(),
            size_bytes: 0,
        };
        let applied = retry.apply(SessionEvent::FileParsed { source, file })?;
        retry.apply(SessionEvent::Configure(configuration.clone()))?;

        let transition = applied.transition.ok_or(SessionError::InvalidTransition {
            phase: retry.phase(),
            event: "FileParsed",
        })?;
        Ok((retry, transition))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn target(&self) -> ImportTarget {
        self.target
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase.kind()
    }

    pub fn source(&self) -> Option<&SourceFile> {
        match &self.phase {
            Phase::Selecting => None,
            Phase::Previewing { source, .. }
            | Phase::Committing { source, .. }
            | Phase::Done { source, .. } => Some(source),
        }
    }

    /// Parsed records, visible only while previewing
    pub fn preview(&self) -> Option<&ParsedFile> {
        match &self.phase {
            Phase::Previewing { file, .. } => Some(file),
            _ => None,
        }
    }

    pub fn configuration(&self) -> Option<&ImportConfiguration> {
        match &self.phase {
            Phase::Selecting => None,
            Phase::Previewing { configuration, .. }
            | Phase::Committing { configuration, .. }
            | Phase::Done { configuration, .. } => Some(configuration),
        }
    }

    /// Row counters; zero before the commit starts
    pub fn progress(&self) -> ImportCounts {
        match &self.phase {
            Phase::Committing { progress, .. } => *progress,
            Phase::Done { summary, .. } => summary.counts(),
            _ => ImportCounts::default(),
        }
    }

    pub fn summary(&self) -> Option<&ImportSummary> {
        match &self.phase {
            Phase::Done { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn failed_rows(&self) -> &[FailedRow] {
        match &self.phase {
            Phase::Done { failed_rows, .. } => failed_rows,
            _ => &[],
        }
    }
}

fn check_progress(current: &ImportCounts, next: &ImportCounts) -> Result<(), SessionError> {
    if next.total != current.total {
        return Err(SessionError::InconsistentProgress(format!(
            "total changed from {} to {}",
            current.total, next.total
        )));
    }
    if next.processed < current.processed || next.errors < current.errors {
        return Err(SessionError::InconsistentProgress(format!(
            "counters went backwards ({} → {})",
            current.processed, next.processed
        )));
    }
    if next.processed > next.total || next.errors > next.processed {
        return Err(SessionError::InconsistentProgress(format!(
            "processed={} errors={} exceeds total={}",
            next.processed, next.errors, next.total
        )));
    }
    Ok(())
}

fn check_completion(current: &ImportCounts, outcome: &SubmissionOutcome) -> Result<(), SessionError> {
    check_progress(current, &outcome.counts)?;
    if !outcome.cancelled && outcome.counts.processed != outcome.counts.total {
        return Err(SessionError::InconsistentProgress(format!(
            "completed with {} of {} rows processed",
            outcome.counts.processed, outcome.counts.total
        )));
    }
    Ok(())
}
