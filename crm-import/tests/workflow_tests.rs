//! Import session workflow tests (orchestrator + state machine)

mod helpers;

use crm_common::events::{CrmEvent, EventBus, ImportCounts};
use chrono::Utc;
use crm_import::models::{
    FieldValue, ImportConfiguration, ImportPhase, ImportSession, ImportTarget, SessionError,
    SessionEvent, SourceFile,
};
use crm_import::services::{ImportOrchestrator, ParseError};
use crm_import::ImportError;
use helpers::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

fn source(name: &str) -> SourceFile {
    SourceFile {
        file_name: name.to_string(),
        content_type: Some("text/csv".to_string()),
        size_bytes: 0,
    }
}

fn orchestrator(store: MemoryStore) -> (ImportOrchestrator, EventBus, Arc<MemoryStore>) {
    let event_bus = EventBus::new(256);
    let store = Arc::new(store);
    (
        ImportOrchestrator::new(event_bus.clone(), store.clone()),
        event_bus,
        store,
    )
}

fn phase(orchestrator: &ImportOrchestrator, session_id: Uuid) -> ImportPhase {
    orchestrator.registry().with(session_id, |s| s.phase()).unwrap()
}

fn collect(rx: &mut broadcast::Receiver<CrmEvent>) -> Vec<CrmEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_commit_with_one_failing_row() {
    let (orchestrator, event_bus, store) = orchestrator(MemoryStore::failing_on(&[2]));
    let mut rx = event_bus.subscribe();

    let session_id = orchestrator
        .start_session(ImportTarget::Customer, source("customers.csv"), helpers::CUSTOMERS_CSV.as_bytes())
        .unwrap();
    assert_eq!(phase(&orchestrator, session_id), ImportPhase::Previewing);

    let counts = orchestrator.commit(session_id).unwrap().await.unwrap();
    assert_eq!(counts, ImportCounts { processed: 3, total: 3, errors: 1 });

    orchestrator
        .registry()
        .with(session_id, |session| {
            assert_eq!(session.phase(), ImportPhase::Done);
            let summary = session.summary().unwrap();
            assert_eq!(summary.total, 3);
            assert_eq!(summary.errors, 1);
            assert_eq!(summary.succeeded, 2);
            assert!(!summary.cancelled);
            assert_eq!(session.failed_rows().len(), 1);
            assert_eq!(session.failed_rows()[0].raw.get("Email"), Some("john@x.com"));
        })
        .unwrap();

    let names: Vec<String> = store
        .created()
        .iter()
        .filter_map(|r| r.text("name").map(String::from))
        .collect();
    assert_eq!(names, vec!["Jane Doe", "Initech"]);

    let events = collect(&mut rx);
    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            CrmEvent::ImportProgressUpdate { counts, .. } => Some(counts.processed),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2, 3]);

    let phases: Vec<(String, String)> = events
        .iter()
        .filter_map(|e| match e {
            CrmEvent::ImportPhaseChanged { old_phase, new_phase, .. } => {
                Some((old_phase.clone(), new_phase.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            ("SELECTING".to_string(), "PREVIEWING".to_string()),
            ("PREVIEWING".to_string(), "COMMITTING".to_string()),
            ("COMMITTING".to_string(), "DONE".to_string()),
        ]
    );

    match events.last() {
        Some(CrmEvent::ImportSessionCompleted { counts, cancelled, .. }) => {
            assert_eq!(counts.errors, 1);
            assert!(!cancelled);
        }
        other => panic!("expected completion event last, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_file_registers_nothing() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());

    let err = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), b"Name,Email\n")
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse(ParseError::EmptyFile)));

    let err = orchestrator
        .start_session(
            ImportTarget::Lead,
            SourceFile {
                file_name: "leads.pdf".to_string(),
                content_type: None,
                size_bytes: 9,
            },
            b"Name\nAda\n",
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse(ParseError::UnsupportedFormat(_))));

    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_parse_failure_keeps_session_selecting() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());
    let session_id = orchestrator.create_session(ImportTarget::Customer);

    let err = orchestrator
        .select_file(session_id, source("empty.csv"), b"")
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse(ParseError::EmptyFile)));
    assert_eq!(phase(&orchestrator, session_id), ImportPhase::Selecting);

    orchestrator
        .select_file(session_id, source("ok.csv"), helpers::CUSTOMERS_CSV.as_bytes())
        .unwrap();
    assert_eq!(phase(&orchestrator, session_id), ImportPhase::Previewing);
}

#[tokio::test]
async fn test_cancel_from_preview_discards_records_and_configuration() {
    let (orchestrator, _bus, store) = orchestrator(MemoryStore::new());
    let session_id = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), helpers::LEADS_CSV.as_bytes())
        .unwrap();
    orchestrator
        .configure(session_id, ImportConfiguration::new().with("owner", "Alice"))
        .unwrap();

    assert_eq!(orchestrator.cancel(session_id).unwrap(), ImportPhase::Selecting);
    orchestrator
        .registry()
        .with(session_id, |s| {
            assert!(s.preview().is_none());
            assert!(s.configuration().is_none());
        })
        .unwrap();

    // Next selection starts from a clean slate
    orchestrator
        .select_file(session_id, source("again.csv"), helpers::LEADS_CSV.as_bytes())
        .unwrap();
    let configuration = orchestrator
        .registry()
        .with(session_id, |s| s.configuration().cloned())
        .unwrap()
        .unwrap();
    assert!(configuration.is_empty());
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_configuration_rules() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());
    let session_id = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), helpers::LEADS_CSV.as_bytes())
        .unwrap();

    let err = orchestrator
        .configure(session_id, ImportConfiguration::new().with("favourite_colour", "blue"))
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Session(SessionError::UnknownConfigurationField { .. })
    ));

    orchestrator
        .configure(session_id, ImportConfiguration::new().with("group", "Partners"))
        .unwrap();
    orchestrator.commit(session_id).unwrap().await.unwrap();

    let err = orchestrator
        .configure(session_id, ImportConfiguration::new().with("group", "Other"))
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Session(SessionError::InvalidTransition {
            phase: ImportPhase::Done,
            ..
        })
    ));
}

#[tokio::test]
async fn test_fixed_fields_are_not_configurable() {
    let (orchestrator, _bus, store) = orchestrator(MemoryStore::new());
    let customers = orchestrator
        .start_session(ImportTarget::Customer, source("c.csv"), helpers::CUSTOMERS_CSV.as_bytes())
        .unwrap();

    for (field, value) in [("is_active", "yes"), ("currency", "EUR"), ("name", "Everyone"), ("owner", "Alice")] {
        let err = orchestrator
            .configure(customers, ImportConfiguration::new().with(field, value))
            .unwrap_err();
        assert!(
            matches!(
                &err,
                ImportError::Session(SessionError::UnknownConfigurationField { field: f, .. }) if f == field
            ),
            "{} should be rejected, got {:?}",
            field,
            err
        );
    }

    let leads = orchestrator
        .start_session(ImportTarget::Lead, source("l.csv"), helpers::LEADS_CSV.as_bytes())
        .unwrap();
    assert!(orchestrator
        .configure(leads, ImportConfiguration::new().with("status", "Won"))
        .is_err());

    orchestrator.commit(customers).unwrap().await.unwrap();
    let created = store.created();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|r| r.get("is_active") == Some(&FieldValue::Integer(1))));
    assert!(created.iter().all(|r| r.text("currency") == Some("USD")));
}

#[tokio::test]
async fn test_configuration_reaches_submitted_records() {
    let (orchestrator, _bus, store) = orchestrator(MemoryStore::new());
    let session_id = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), helpers::LEADS_CSV.as_bytes())
        .unwrap();
    orchestrator
        .configure(
            session_id,
            ImportConfiguration::new().with("owner", "Alice").with("group", "Partners"),
        )
        .unwrap();
    orchestrator.commit(session_id).unwrap().await.unwrap();

    let created = store.created();
    assert_eq!(created.len(), 4);
    assert!(created.iter().all(|r| r.text("owner") == Some("Alice")));
    assert!(created.iter().all(|r| r.text("group") == Some("Partners")));
}

#[tokio::test]
async fn test_done_session_rejects_further_events() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());
    let session_id = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), helpers::csv_rows(2).as_bytes())
        .unwrap();
    orchestrator.commit(session_id).unwrap().await.unwrap();

    assert!(matches!(
        orchestrator.commit(session_id).unwrap_err(),
        ImportError::Session(SessionError::InvalidTransition { .. })
    ));
    assert!(matches!(
        orchestrator.cancel(session_id).unwrap_err(),
        ImportError::Session(SessionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_retry_failed_rows_creates_new_session() {
    let (orchestrator, _bus, store) = orchestrator(MemoryStore::failing_on(&[1, 3]));
    let session_id = orchestrator
        .start_session(ImportTarget::Lead, source("leads.csv"), helpers::csv_rows(4).as_bytes())
        .unwrap();
    orchestrator
        .configure(session_id, ImportConfiguration::new().with("owner", "Bob"))
        .unwrap();
    orchestrator.commit(session_id).unwrap().await.unwrap();

    let retry_id = orchestrator.retry_failed(session_id).unwrap();
    assert_ne!(retry_id, session_id);
    orchestrator
        .registry()
        .with(retry_id, |s| {
            assert_eq!(s.phase(), ImportPhase::Previewing);
            assert_eq!(s.target(), ImportTarget::Lead);
            let names: Vec<_> = s.preview().unwrap().records().iter().map(|r| r.get("Name").unwrap().to_string()).collect();
            assert_eq!(names, vec!["Lead 1", "Lead 3"]);
            assert_eq!(s.configuration().unwrap().get("owner"), Some("Bob"));
        })
        .unwrap();

    // Store accepts everything from call 5 on
    let counts = orchestrator.commit(retry_id).unwrap().await.unwrap();
    assert_eq!(counts, ImportCounts { processed: 2, total: 2, errors: 0 });
    assert_eq!(store.created().len(), 4);

    assert!(matches!(
        orchestrator.retry_failed(retry_id).unwrap_err(),
        ImportError::Session(SessionError::NothingToRetry)
    ));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());
    let missing = Uuid::new_v4();
    assert!(matches!(
        orchestrator.commit(missing).unwrap_err(),
        ImportError::Session(SessionError::NotFound(id)) if id == missing
    ));
}

#[test]
fn test_state_machine_forward_only() {
    let mut session = ImportSession::new(ImportTarget::Customer);
    let file = crm_import::services::TabularParser::new()
        .parse(helpers::CUSTOMERS_CSV.as_bytes())
        .unwrap();

    for event in [SessionEvent::Confirm, SessionEvent::Cancel] {
        assert!(session.apply(event).is_err());
    }
    session
        .apply(SessionEvent::FileParsed { source: source("a.csv"), file: file.clone() })
        .unwrap();
    assert!(matches!(
        session.apply(SessionEvent::FileParsed { source: source("b.csv"), file }),
        Err(SessionError::InvalidTransition {
            phase: ImportPhase::Previewing,
            event: "FileParsed"
        })
    ));
    assert!(matches!(
        session.apply(SessionEvent::Progress(ImportCounts::default())),
        Err(SessionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_discard_drops_idle_sessions_only() {
    let gate = Arc::new(Semaphore::new(0));
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::gated(gate.clone()));

    let preview = orchestrator
        .start_session(ImportTarget::Lead, source("a.csv"), helpers::csv_rows(1).as_bytes())
        .unwrap();
    orchestrator.discard(preview).unwrap();
    assert!(matches!(
        orchestrator.discard(preview).unwrap_err(),
        ImportError::Session(SessionError::NotFound(_))
    ));

    let committing = orchestrator
        .start_session(ImportTarget::Lead, source("b.csv"), helpers::csv_rows(1).as_bytes())
        .unwrap();
    let handle = orchestrator.commit(committing).unwrap();
    assert!(matches!(
        orchestrator.discard(committing).unwrap_err(),
        ImportError::Session(SessionError::InvalidTransition {
            phase: ImportPhase::Committing,
            ..
        })
    ));

    gate.add_permits(1);
    handle.await.unwrap();
    orchestrator.discard(committing).unwrap();
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_expired_sessions_are_evicted_except_committing() {
    let gate = Arc::new(Semaphore::new(2));
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::gated(gate.clone()));

    let done = orchestrator
        .start_session(ImportTarget::Lead, source("done.csv"), helpers::csv_rows(2).as_bytes())
        .unwrap();
    orchestrator.commit(done).unwrap().await.unwrap();

    let cancelled = orchestrator
        .start_session(ImportTarget::Customer, source("c.csv"), helpers::CUSTOMERS_CSV.as_bytes())
        .unwrap();
    orchestrator.cancel(cancelled).unwrap();
    orchestrator
        .start_session(ImportTarget::Lead, source("abandoned.csv"), helpers::csv_rows(1).as_bytes())
        .unwrap();

    // Blocks on the gate until permits are added
    let committing = orchestrator
        .start_session(ImportTarget::Lead, source("busy.csv"), helpers::csv_rows(2).as_bytes())
        .unwrap();
    let handle = orchestrator.commit(committing).unwrap();
    assert_eq!(orchestrator.registry().len(), 4);

    assert_eq!(orchestrator.evict_expired(Utc::now()), 0);
    assert_eq!(orchestrator.evict_expired(Utc::now() + chrono::Duration::hours(2)), 3);
    assert_eq!(orchestrator.registry().len(), 1);
    assert_eq!(phase(&orchestrator, committing), ImportPhase::Committing);

    gate.add_permits(2);
    handle.await.unwrap();
    assert_eq!(phase(&orchestrator, committing), ImportPhase::Done);
}

#[tokio::test]
async fn test_new_session_sweeps_expired_sessions() {
    let (orchestrator, _bus, _store) = orchestrator(MemoryStore::new());
    let orchestrator = orchestrator.with_retention(Duration::ZERO);

    for _ in 0..5 {
        let session_id = orchestrator
            .start_session(ImportTarget::Customer, source("c.csv"), helpers::CUSTOMERS_CSV.as_bytes())
            .unwrap();
        orchestrator.cancel(session_id).unwrap();
    }
    for _ in 0..3 {
        let session_id = orchestrator
            .start_session(ImportTarget::Lead, source("l.csv"), helpers::csv_rows(2).as_bytes())
            .unwrap();
        orchestrator.commit(session_id).unwrap().await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    let latest = orchestrator
        .start_session(ImportTarget::Lead, source("l.csv"), helpers::csv_rows(1).as_bytes())
        .unwrap();
    assert_eq!(orchestrator.registry().len(), 1);
    assert_eq!(phase(&orchestrator, latest), ImportPhase::Previewing);
}
