//! Parse → map → submit pipeline tests

mod helpers;

use crm_common::events::ImportCounts;
use crm_import::models::{FieldValue, ImportConfiguration, ImportTarget};
use crm_import::services::field_mapper::map;
use crm_import::services::{
    mapping_for, BatchSubmitter, MappedRow, SubmitterEvent, TabularParser, CUSTOMER_MAPPING,
    LEAD_MAPPING,
};
use helpers::MemoryStore;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

fn mapped_rows(csv: &str, target: ImportTarget, configuration: &ImportConfiguration) -> Vec<MappedRow> {
    let file = TabularParser::new().parse(csv.as_bytes()).unwrap();
    let (_, records) = file.into_parts();
    records
        .into_iter()
        .enumerate()
        .map(|(i, raw)| MappedRow {
            row_number: i + 1,
            record: map(&raw, mapping_for(target), configuration),
            raw,
        })
        .collect()
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SubmitterEvent>) -> Vec<SubmitterEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_customer_row_maps_to_submission_record() {
    let file = TabularParser::new()
        .parse(b"Firstname,Lastname,Email\nJane,Doe,jane@x.com\n")
        .unwrap();
    let record = map(&file.records()[0], &CUSTOMER_MAPPING, &ImportConfiguration::default());

    assert_eq!(record.text("name"), Some("Jane Doe"));
    assert_eq!(record.text("email"), Some("jane@x.com"));
    assert_eq!(record.text("currency"), Some("USD"));
    assert_eq!(record.text("language"), Some("English"));
    assert_eq!(record.text("country"), Some("United States"));
    assert_eq!(record.get("is_active"), Some(&FieldValue::Integer(1)));
    assert_eq!(record.get("company"), Some(&FieldValue::Null));

    let body = serde_json::to_value(&record).unwrap();
    assert_eq!(body["name"], "Jane Doe");
    assert_eq!(body["is_active"], 1);
    assert!(body["phone"].is_null());
}

#[test]
fn test_lead_rows_coerce_and_default() {
    let configuration = ImportConfiguration::new()
        .with("owner", "Alice")
        .with("group", "Partners");
    let rows = mapped_rows(helpers::LEADS_CSV, ImportTarget::Lead, &configuration);

    // Blank row skipped
    assert_eq!(rows.len(), 4);

    let ada = &rows[0].record;
    assert_eq!(ada.get("value"), Some(&FieldValue::Float(1200.5)));
    assert_eq!(ada.text("status"), Some("Qualified"));
    assert_eq!(ada.text("owner"), Some("Alice"));
    assert_eq!(ada.text("group"), Some("Partners"));

    let grace = &rows[1].record;
    assert_eq!(grace.get("value"), Some(&FieldValue::Float(0.0)));
    assert_eq!(grace.text("status"), Some("New"));

    let linus = &rows[2].record;
    assert_eq!(linus.get("company"), Some(&FieldValue::Null));
    assert_eq!(rows[3].row_number, 4);
}

#[test]
fn test_every_mapped_field_matches_its_coercion() {
    for (csv, mapping) in [
        (helpers::CUSTOMERS_CSV, &CUSTOMER_MAPPING),
        (helpers::LEADS_CSV, &LEAD_MAPPING),
    ] {
        let file = TabularParser::new().parse(csv.as_bytes()).unwrap();
        for raw in file.records() {
            let record = map(raw, mapping, &ImportConfiguration::default());
            assert_eq!(record.fields().len(), mapping.rules.len());
            for rule in mapping.rules {
                let value = record.get(rule.field).unwrap();
                match rule.coercion {
                    crm_import::services::Coercion::Integer => {
                        assert!(matches!(value, FieldValue::Integer(_)))
                    }
                    crm_import::services::Coercion::Float => {
                        assert!(matches!(value, FieldValue::Float(_)))
                    }
                    _ => assert!(matches!(value, FieldValue::Text(_) | FieldValue::Null)),
                }
            }
        }
    }
}

#[tokio::test]
async fn test_progress_is_gapless_with_failures() {
    let store = Arc::new(MemoryStore::failing_on(&[2]));
    let submitter = BatchSubmitter::new(store.clone());
    let rows = mapped_rows(helpers::CUSTOMERS_CSV, ImportTarget::Customer, &ImportConfiguration::default());
    let (tx, mut rx) = mpsc::unbounded_channel::<SubmitterEvent>();

    let outcome = submitter
        .submit(rows.len(), rows, &tx, &CancellationToken::new())
        .await;

    assert_eq!(outcome.counts, ImportCounts { processed: 3, total: 3, errors: 1 });
    assert!(!outcome.cancelled);
    assert_eq!(outcome.failed_rows.len(), 1);
    assert_eq!(outcome.failed_rows[0].row_number, 2);
    assert_eq!(outcome.failed_rows[0].raw.get("Firstname"), Some("John"));
    assert!(outcome.failed_rows[0].error.contains("422"));
    assert_eq!(store.created().len(), 2);

    let events = drain(&mut rx);
    let processed: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SubmitterEvent::Progress(c) => Some(c.processed),
            _ => None,
        })
        .collect();
    assert_eq!(processed, vec![1, 2, 3]);
    assert_eq!(events.last(), Some(&SubmitterEvent::Complete(outcome)));
}

#[tokio::test]
async fn test_all_rows_failing_still_completes() {
    let store = Arc::new(MemoryStore::failing_on(&[1, 2, 3]));
    let submitter = BatchSubmitter::new(store);
    let rows = mapped_rows(helpers::CUSTOMERS_CSV, ImportTarget::Customer, &ImportConfiguration::default());
    let (tx, _rx) = mpsc::unbounded_channel::<SubmitterEvent>();

    let outcome = submitter.submit(3, rows, &tx, &CancellationToken::new()).await;
    assert_eq!(outcome.counts, ImportCounts { processed: 3, total: 3, errors: 3 });
    assert_eq!(outcome.counts.succeeded(), 0);
}

#[tokio::test]
async fn test_cancel_before_start_submits_nothing() {
    let store = Arc::new(MemoryStore::new());
    let submitter = BatchSubmitter::new(store.clone());
    let rows = mapped_rows(&helpers::csv_rows(4), ImportTarget::Lead, &ImportConfiguration::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (tx, mut rx) = mpsc::unbounded_channel::<SubmitterEvent>();

    let outcome = submitter.submit(4, rows, &tx, &cancel).await;
    assert!(outcome.cancelled);
    assert_eq!(outcome.counts.processed, 0);
    assert_eq!(outcome.skipped(), 4);
    assert_eq!(store.calls(), 0);
    assert_eq!(drain(&mut rx), vec![SubmitterEvent::Complete(outcome)]);
}

#[tokio::test]
async fn test_cancel_between_rows_stops_the_batch() {
    let gate = Arc::new(Semaphore::new(1));
    let store = Arc::new(MemoryStore::gated(gate.clone()));
    let submitter = BatchSubmitter::new(store.clone());
    let rows = mapped_rows(&helpers::csv_rows(5), ImportTarget::Lead, &ImportConfiguration::default());
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<SubmitterEvent>();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { submitter.submit(5, rows, &tx, &cancel).await })
    };

    // First row goes through, the second waits on the gate
    match rx.recv().await {
        Some(SubmitterEvent::Progress(c)) => assert_eq!(c.processed, 1),
        other => panic!("unexpected event: {:?}", other),
    }
    cancel.cancel();
    gate.add_permits(10);

    let outcome = task.await.unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.counts.processed >= 1 && outcome.counts.processed <= 2);
    assert_eq!(outcome.counts.total, 5);
    assert_eq!(store.calls(), outcome.counts.processed);
}
