//! Import workflow type definitions
//!
//! Supporting types for crm-import progress tracking.

use serde::{Deserialize, Serialize};

/// Row counters carried by import progress and completion events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    /// Rows submitted so far (successful or not)
    pub processed: usize,
    /// Rows in the batch, fixed when the commit started
    pub total: usize,
    /// Rows the remote store rejected
    pub errors: usize,
}

impl ImportCounts {
    /// Rows that were accepted by the remote store
    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.errors)
    }

    /// Completion percentage (0.0 - 100.0)
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}
