//! Remote record store client
//!
//! The CRM REST API exposes one create endpoint per record type and no bulk
//! endpoint; every row is a separate POST.

use crate::models::{CustomerListing, DomainRecord, ImportTarget};
use async_trait::async_trait;
use crm_common::config::RemoteConfig;
use std::time::Duration;
use thiserror::Error;

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    /// Store answered with a non-success status
    #[error("Store rejected record ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Destination for mapped records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create one record
    async fn create(&self, record: &DomainRecord) -> Result<(), StoreError>;

    /// Current customer listing (used by export)
    async fn list_customers(&self) -> Result<Vec<CustomerListing>, StoreError>;
}

/// [`RecordStore`] backed by the CRM REST API
pub struct HttpRecordStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRecordStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create endpoint for a record type
    pub fn endpoint(&self, target: ImportTarget) -> String {
        match target {
            ImportTarget::Customer => format!("{}/contact", self.base_url),
            ImportTarget::Lead => format!("{}/lead", self.base_url),
        }
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn create(&self, record: &DomainRecord) -> Result<(), StoreError> {
        let url = self.endpoint(record.target());
        tracing::debug!(url = %url, target = %record.target(), "Creating record");

        let response = self
            .http_client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<CustomerListing>, StoreError> {
        let url = self.endpoint(ImportTarget::Customer);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_per_target() {
        let store = HttpRecordStore::new(&RemoteConfig {
            base_url: "http://crm.local/api/".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();
        assert_eq!(store.base_url(), "http://crm.local/api");
        assert_eq!(store.endpoint(ImportTarget::Customer), "http://crm.local/api/contact");
        assert_eq!(store.endpoint(ImportTarget::Lead), "http://crm.local/api/lead");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let store = HttpRecordStore::new(&RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();
        let record = DomainRecord::new(ImportTarget::Lead, vec![]);
        let err = store.create(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
    }
}
