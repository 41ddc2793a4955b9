//! Pipeline context management.
//!
//! Provides batch and per-capture context for logging.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Context for one batch of captured requests.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub batch_id: String,
    pub received_at: DateTime<Utc>,
    pub store: String,
}

impl CaptureContext {
    pub fn new(store: &str) -> Self {
        Self::at(store, Utc::now())
    }

    /// Context with a fixed receive time; captures without their own
    /// timestamp are stamped with it.
    pub fn at(store: &str, received_at: DateTime<Utc>) -> Self {
        let batch_id = format!("cap-{}", &Uuid::new_v4().simple().to_string()[..8]);
        Self {
            batch_id,
            received_at,
            store: store.to_string(),
        }
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.store).with_capture(&self.batch_id)
    }

    /// Context for the `index`-th capture in this batch.
    pub fn capture_log_context(&self, index: usize) -> LogContext {
        self.log_context().with_item(index)
    }
}
