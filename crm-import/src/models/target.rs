//! Import target record types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of record an import produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportTarget {
    /// Customer contact (company + primary contact)
    Customer,
    /// Sales lead
    Lead,
}

impl ImportTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportTarget::Customer => "customer",
            ImportTarget::Lead => "lead",
        }
    }

    /// File name offered for the downloadable header template
    pub fn template_file_name(&self) -> &'static str {
        match self {
            ImportTarget::Customer => "customer_import_template.csv",
            ImportTarget::Lead => "lead_import_template.csv",
        }
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "customers" => Ok(ImportTarget::Customer),
            "lead" | "leads" => Ok(ImportTarget::Lead),
            other => Err(format!("Unknown import target: {}", other)),
        }
    }
}
