//! Service modules for the import pipeline
//!
//! parse → map → submit, plus session orchestration, templates and export.

pub mod batch_submitter;
pub mod exporter;
pub mod field_mapper;
pub mod import_orchestrator;
pub mod mappings;
pub mod record_store;
pub mod session_registry;
pub mod tabular_parser;
pub mod template;

pub use batch_submitter::{BatchSubmitter, MappedRow, ProgressObserver, SubmitterEvent};
pub use exporter::{export_customers, export_listing, EXPORT_FILE_NAME};
pub use field_mapper::{Coercion, FieldMapper, FieldMapping, FieldRule, FieldSource};
pub use import_orchestrator::ImportOrchestrator;
pub use mappings::{mapping_for, template_headers, CUSTOMER_MAPPING, LEAD_MAPPING, LEAD_STATUSES};
pub use record_store::{HttpRecordStore, RecordStore, StoreError};
pub use session_registry::SessionRegistry;
pub use tabular_parser::{ParseError, TabularParser};
pub use template::template_csv;
