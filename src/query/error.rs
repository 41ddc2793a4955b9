use thiserror::Error;

use crate::storage::error::StoreError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("timeline window must be between 1 and {max} hours, got {hours}")]
    InvalidWindow { hours: u32, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("CSV export failed: {0}")]
    Export(#[from] csv::Error),
}
