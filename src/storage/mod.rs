//! Storage module.
//!
//! Durable, append-only event store for flow records:
//! - `models` - Flow record schema (what lands on disk)
//! - `snapshot` - Active/archive file formats and atomic writes
//! - `store` - The store itself (append, rotation, clear)

pub mod error;
pub mod models;
pub mod snapshot;
pub mod store;

pub use error::StoreError;
pub use models::*;
pub use snapshot::{ArchiveInfo, ArchiveReason, ArchiveSnapshot};
pub use store::{ClearedSet, EventStore, RecordSnapshot};
