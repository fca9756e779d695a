//! Commit results
//!
//! The batch submitter folds every row into a [`SubmissionOutcome`]; the
//! session turns it into a read-only [`ImportSummary`] when it reaches Done.

use super::raw_record::RawRecord;
use chrono::{DateTime, Utc};
use crm_common::events::ImportCounts;
use serde::Serialize;

/// A row the remote store rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRow {
    /// 1-based data row number (header row not counted)
    pub row_number: usize,

    /// The row as it was parsed, kept for re-submission
    pub raw: RawRecord,

    /// Error reported by the store
    pub error: String,
}

/// Result of folding a record sequence through the remote store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub counts: ImportCounts,

    /// Commit stopped between rows on request
    pub cancelled: bool,

    pub failed_rows: Vec<FailedRow>,
}

impl SubmissionOutcome {
    /// Rows never submitted because the commit was cancelled
    pub fn skipped(&self) -> usize {
        self.counts.total.saturating_sub(self.counts.processed)
    }
}

/// Completion summary held by a Done session
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub errors: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

impl ImportSummary {
    pub fn from_outcome(outcome: &SubmissionOutcome, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        Self {
            total: outcome.counts.total,
            processed: outcome.counts.processed,
            succeeded: outcome.counts.succeeded(),
            errors: outcome.counts.errors,
            skipped: outcome.skipped(),
            cancelled: outcome.cancelled,
            started_at,
            finished_at,
            duration_seconds: (finished_at - started_at).num_seconds().max(0) as u64,
        }
    }

    pub fn counts(&self) -> ImportCounts {
        ImportCounts {
            processed: self.processed,
            total: self.total,
            errors: self.errors,
        }
    }
}
