//! Event store errors.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::validation::record::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a valid store snapshot: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} is inconsistent: {reason}", .path.display())]
    Inconsistent { path: PathBuf, reason: String },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed record: {0}")]
    Malformed(#[from] ValidationError),
}

impl StoreError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Map a serde_json failure while writing `path`.
    pub(crate) fn from_json_write(path: &Path, err: serde_json::Error) -> Self {
        if err.is_io() {
            StoreError::io(path, err.into())
        } else {
            StoreError::Encode(err)
        }
    }

    /// Map a serde_json failure while reading `path`.
    pub(crate) fn from_json_read(path: &Path, err: serde_json::Error) -> Self {
        if err.is_io() {
            StoreError::io(path, err.into())
        } else {
            StoreError::Corrupt {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    /// Persistence failures (everything except a refused record).
    pub fn is_storage_failure(&self) -> bool {
        !self.is_malformed()
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Malformed(_))
    }

    pub(crate) fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::Io { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
    }
}
