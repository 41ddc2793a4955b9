//! Aggregation engine.
//!
//! Derives dashboard statistics from a snapshot of flow records:
//! - Totals, recent counts, credential attempts and unique sources
//! - Top countries and credentials with first-seen tie-break
//! - Hourly attack timeline
//! - Flow-level averages

pub mod counts;
pub mod engine;

pub use counts::CountTable;
pub use engine::*;
