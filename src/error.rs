//! Error types shared by all components of the model.
//!
//! Every error is fatal for a run. They are raised during setup (configuration,
//! input files, process grid) or when a peer rank fails to take part in a
//! communication step.

use std::path::PathBuf;

use thiserror::Error;

use crate::comm::Rank;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters or an unusable process count.
    #[error("configuration error: {0}")]
    Config(String),

    /// A file could not be opened, read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file was readable but its content is malformed.
    #[error("malformed file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// The global grid cannot be tiled across the process grid.
    #[error("partition error: {0}")]
    Partition(String),

    /// Message passing between ranks failed.
    #[error(transparent)]
    Comm(#[from] CommError),
}

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    pub fn partition(reason: impl Into<String>) -> Self {
        Self::Partition(reason.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the message passing layer.
#[derive(Error, Debug, PartialEq)]
pub enum CommError {
    /// The peer rank dropped out of the run.
    #[error("rank {peer} disconnected")]
    Disconnected { peer: Rank },

    /// The peer rank gave up and told the others so.
    #[error("rank {peer} aborted the run")]
    Aborted { peer: Rank },

    /// A message arrived out of protocol order.
    #[error("unexpected message from rank {peer}: expected {expected}, got {got}")]
    TagMismatch {
        peer: Rank,
        expected: String,
        got: String,
    },

    /// A message did not have the announced length.
    #[error("message from rank {peer} has {got} values, expected {expected}")]
    LengthMismatch {
        peer: Rank,
        expected: usize,
        got: usize,
    },
}
