//! Shared test helpers: in-memory record store and sample files

#![allow(dead_code)]

use async_trait::async_trait;
use crm_import::models::{CustomerListing, DomainRecord};
use crm_import::services::{RecordStore, StoreError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Record store that keeps everything in memory
///
/// Calls listed in `fail_calls` (1-based) are rejected with a 422. When a
/// gate is set, every create waits for one permit first.
#[derive(Default)]
pub struct MemoryStore {
    created: Mutex<Vec<DomainRecord>>,
    calls: Mutex<usize>,
    fail_calls: HashSet<usize>,
    gate: Option<Arc<Semaphore>>,
    customers: Vec<CustomerListing>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with_customers(customers: Vec<CustomerListing>) -> Self {
        Self {
            customers,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<DomainRecord> {
        self.created.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, record: &DomainRecord) -> Result<(), StoreError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };

        if self.fail_calls.contains(&call) {
            return Err(StoreError::Rejected {
                status: 422,
                body: format!("call {} rejected", call),
            });
        }

        self.created.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<CustomerListing>, StoreError> {
        Ok(self.customers.clone())
    }
}

pub const CUSTOMERS_CSV: &str = "\
Firstname,Lastname,Email,Company
Jane,Doe,jane@x.com,Acme
John,Smith,john@x.com,Globex
,,info@initech.com,Initech
";

pub const LEADS_CSV: &str = "\
Name,Company,Status,Lead value,Email
Ada,Analytical Engines,Qualified,1200.50,ada@engines.io
Grace,Compilers Inc,,not-a-number,grace@compilers.dev
Linus,,Won,300,linus@kernel.org
,,,,
Margaret,Apollo,Contacted,99,margaret@nasa.gov
";

pub fn csv_rows(rows: usize) -> String {
    let mut csv = String::from("Name,Email\n");
    for i in 1..=rows {
        csv.push_str(&format!("Lead {},lead{}@example.com\n", i, i));
    }
    csv
}
