//! # CRM Common Library
//!
//! Shared code for the CRM back-office services including:
//! - Error types
//! - Event types (CrmEvent enum) and the EventBus
//! - Configuration loading
//! - SSE utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
