//! Record validation module.
//!
//! Rejects malformed flow records before append:
//! - Required fields present
//! - Latitude/longitude both present or both absent
//! - Flow metrics finite and non-negative

pub mod record;

pub use record::*;
