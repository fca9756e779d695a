//! Sequential batch submitter
//!
//! The commit is a fold over the mapped-record sequence: each row is awaited
//! before the next one starts, and the running counters are published to
//! the observer after every row. Row failures are counted and retained, never
//! retried; the batch always continues. Cancellation is honoured between
//! rows only.

use super::record_store::RecordStore;
use crate::models::{DomainRecord, FailedRow, RawRecord, SubmissionOutcome};
use crm_common::events::ImportCounts;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One row ready for submission
#[derive(Debug, Clone)]
pub struct MappedRow {
    /// 1-based data row number
    pub row_number: usize,
    pub raw: RawRecord,
    pub record: DomainRecord,
}

/// Receives progress synchronously from the submitter
///
/// Implementations must return quickly; they run on the commit task between
/// rows.
pub trait ProgressObserver: Send + Sync {
    /// Called once per row, in order, after the row's submission finished
    fn on_progress(&self, counts: ImportCounts);

    /// Called once after the last row (or after cancellation)
    fn on_complete(&self, outcome: &SubmissionOutcome);
}

impl<A: ProgressObserver, B: ProgressObserver> ProgressObserver for (A, B) {
    fn on_progress(&self, counts: ImportCounts) {
        self.0.on_progress(counts);
        self.1.on_progress(counts);
    }

    fn on_complete(&self, outcome: &SubmissionOutcome) {
        self.0.on_complete(outcome);
        self.1.on_complete(outcome);
    }
}

/// Messages sent by the channel observer
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitterEvent {
    Progress(ImportCounts),
    Complete(SubmissionOutcome),
}

/// Forwards progress into an unbounded channel (never blocks the submitter)
impl ProgressObserver for mpsc::UnboundedSender<SubmitterEvent> {
    fn on_progress(&self, counts: ImportCounts) {
        let _ = self.send(SubmitterEvent::Progress(counts));
    }

    fn on_complete(&self, outcome: &SubmissionOutcome) {
        let _ = self.send(SubmitterEvent::Complete(outcome.clone()));
    }
}

/// Submits rows one at a time to a [`RecordStore`]
#[derive(Clone)]
pub struct BatchSubmitter {
    store: Arc<dyn RecordStore>,
}

impl BatchSubmitter {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Submit `rows` sequentially
    ///
    /// `total` is the frozen record count; at most `total` rows are taken.
    /// Returns the final counters, the cancelled flag and every failed row.
    pub async fn submit<I, O>(
        &self,
        total: usize,
        rows: I,
        observer: &O,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome
    where
        I: IntoIterator<Item = MappedRow>,
        O: ProgressObserver + ?Sized,
    {
        let mut counts = ImportCounts {
            processed: 0,
            total,
            errors: 0,
        };
        let mut failed_rows = Vec::new();
        let mut cancelled = false;

        for row in rows.into_iter().take(total) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let result = self.store.create(&row.record).await;
            counts.processed += 1;

            match result {
                Ok(()) => {
                    tracing::debug!(row = row.row_number, processed = counts.processed, total, "Row submitted");
                }
                Err(e) => {
                    counts.errors += 1;
                    tracing::warn!(row = row.row_number, error = %e, "Row submission failed");
                    failed_rows.push(FailedRow {
                        row_number: row.row_number,
                        raw: row.raw,
                        error: e.to_string(),
                    });
                }
            }

            observer.on_progress(counts);
        }

        let outcome = SubmissionOutcome {
            counts,
            cancelled,
            failed_rows,
        };
        observer.on_complete(&outcome);
        outcome
    }
}
