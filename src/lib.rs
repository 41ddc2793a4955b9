//! DecoyFlow Core - capture-and-aggregate pipeline for decoy services
//!
//! This crate stores interaction attempts captured by decoy network services
//! (fake login forms, exposed-file lures, generic HTTP probes) and derives
//! dashboard telemetry from them. The implementation prioritizes:
//!
//! 1. **Durability** - Every append is a full atomic snapshot replacement
//! 2. **Logging** - Every decision point logged with full context
//! 3. **Consistency** - Readers see whole snapshots, never partial writes
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `storage` - Append-only event store with rotation and archival
//! - `aggregation` - Pure statistics over a snapshot
//! - `query` - List, aggregation bundle, CSV export and clear-data operations
//! - `pipeline` - Raw capture ingestion orchestrator
//! - `validation` - Flow record invariants checked before append
//! - `security` - Probe classification
//! - `extraction` - Credential extraction from request bodies
//! - `flow` - Flow feature derivation from packet observations
//! - `config` - Environment-driven configuration
//! - `logging` - Structured logging with store and capture context

pub mod aggregation;
pub mod config;
pub mod extraction;
pub mod flow;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod security;
pub mod storage;
pub mod validation;

pub use config::{ConfigError, QueryOptions, StoreConfig};
pub use pipeline::capture::{process_captures, CaptureBatchResult, CaptureOutcome, RawCapture};
pub use pipeline::context::CaptureContext;
pub use query::{AggregationBundle, ClearOutcome, ListOrder, QueryError, QuerySurface};
pub use storage::{CapturedEvent, EventStore, FlowMetrics, FlowRecord, GeoLocation, StoreError};
pub use validation::ValidationError;

/// Initialize the process-wide logger.
///
/// Defaults to Info; `RUST_LOG` overrides. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
