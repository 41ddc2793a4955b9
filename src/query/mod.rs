//! Query surface.
//!
//! What the dashboard HTTP layer calls: recent records, the aggregation
//! bundle, the CSV export, and the admin "clear data" action.

pub mod error;
pub mod export;
pub mod surface;

pub use error::QueryError;
pub use export::CSV_COLUMNS;
pub use surface::*;
