//! Pipeline orchestration module.
//!
//! Capture ingestion that coordinates:
//! - Payload parsing
//! - Credential extraction
//! - Flow metric derivation
//! - Probe classification
//! - Validation and append

pub mod capture;
pub mod context;

pub use capture::*;
pub use context::*;
