//! Structured logging utilities.
//!
//! Every store and pipeline message carries the store name and, when one is
//! in flight, the capture batch and item, so a single interaction can be
//! followed from parse to append:
//!
//! ```text
//! [store=collected_data] [capture=cap-1a2b3c4d/3] CAPTURE_STORED id=42 class=PathScan
//! ```

use std::fmt;

/// Where a log line comes from: a store, and optionally one capture batch
/// (and one item within it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub store: String,
    pub capture_id: Option<String>,
    pub item: Option<usize>,
}

impl LogContext {
    pub fn new(store: &str) -> Self {
        Self {
            store: store.to_string(),
            capture_id: None,
            item: None,
        }
    }

    pub fn with_capture(&self, capture_id: &str) -> Self {
        Self {
            store: self.store.clone(),
            capture_id: Some(capture_id.to_string()),
            item: None,
        }
    }

    /// Context for the `index`-th payload of the current capture batch.
    pub fn with_item(&self, index: usize) -> Self {
        Self {
            item: Some(index),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[store={}]", self.store)?;
        match (&self.capture_id, self.item) {
            (Some(cid), Some(item)) => write!(f, " [capture={}/{}]", cid, item),
            (Some(cid), None) => write!(f, " [capture={}]", cid),
            (None, Some(item)) => write!(f, " [item={}]", item),
            (None, None) => Ok(()),
        }
    }
}

/// Log `EVENT key=value ...` at `level` with a context prefix.
///
/// Values are rendered with `{:?}` so strings come out quoted and a field
/// with spaces cannot be mistaken for two fields.
#[macro_export]
macro_rules! log_event {
    ($level:expr, $ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::log::log!(
            $level,
            "{} {}{}",
            $ctx,
            $event,
            format_args!(concat!($(" ", stringify!($key), "={:?}"),*) $(, $value)*)
        )
    };
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($($args:tt)+) => { $crate::log_event!(::log::Level::Info, $($args)+) };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($($args:tt)+) => { $crate::log_event!(::log::Level::Warn, $($args)+) };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($($args:tt)+) => { $crate::log_event!(::log::Level::Error, $($args)+) };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($($args:tt)+) => { $crate::log_event!(::log::Level::Debug, $($args)+) };
}
