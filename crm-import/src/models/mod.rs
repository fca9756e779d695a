//! Data models for crm-import
//!
//! - Import targets and their raw/mapped record shapes
//! - Import session state machine
//! - Commit results and customer listings

pub mod customer_listing;
pub mod domain_record;
pub mod import_result;
pub mod import_session;
pub mod raw_record;
pub mod target;

pub use customer_listing::{CustomerListing, ListingQuery, SortDirection, SortKey, StatusFilter};
pub use domain_record::{DomainRecord, FieldValue};
pub use import_result::{FailedRow, ImportSummary, SubmissionOutcome};
pub use import_session::{
    Applied, CommitPlan, ImportConfiguration, ImportPhase, ImportSession, SessionError,
    SessionEvent, SourceFile, StateTransition,
};
pub use raw_record::{ParsedFile, RawRecord};
pub use target::ImportTarget;
