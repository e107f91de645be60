//! Error types for ringkv
//!
//! One unified error enum shared by every layer. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.
//!
//! Propagation policy: node-level operations fail fast and surface the error
//! to the caller; replication and read-repair failures are absorbed into
//! counters and never fail a client request.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ringkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the ringkv store and cluster
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (WAL append, fsync, file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Snapshot store (durable map) failure
    #[error("snapshot store error: {0}")]
    Snapshot(String),

    /// Consistent hash ring has no nodes
    #[error("no nodes in ring")]
    EmptyRing,

    /// Request submitted to a worker pool that is not running
    #[error("worker pool is not running")]
    NotRunning,

    /// Worker queue stayed full past the submit timeout
    #[error("request queue full after {0:?}")]
    Backpressure(Duration),

    /// Operation did not complete within the op timeout.
    ///
    /// The work is not cancelled; the caller must treat the outcome as
    /// unknown.
    #[error("operation timed out after {0:?} (outcome unknown)")]
    Timeout(Duration),

    /// No healthy replica is available for a key
    #[error("no healthy replica available: {0}")]
    ServiceUnavailable(String),

    /// An upstream node returned an error or an unreadable response
    #[error("upstream node error: {0}")]
    Upstream(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Check if this error means the cluster cannot serve the key right now.
    ///
    /// Used by the gateway to map errors to HTTP 503 instead of 500.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_) | Error::EmptyRing)
    }

    /// Check if this error left the operation in an unknown state.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
