//! Error types for the sensor feed
//!
//! Comprehensive error taxonomy using thiserror. A stale reading is not an
//! error and has no variant here.

use thiserror::Error;

/// Failure of one ingestion cycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("Upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("Malformed payload: {reason}")]
    Decode { reason: String },
}

impl FeedError {
    /// Whether the cycle failed while decoding rather than transporting
    pub fn is_decode(&self) -> bool {
        matches!(self, FeedError::Decode { .. })
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode {
            reason: err.to_string(),
        }
    }
}

/// Broadcast publish failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("Broadcast bus is closed")]
    Closed,
}

/// Failure to produce a serialized snapshot
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Snapshot serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Failure writing to a stream connection
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Connection closed")]
    Closed,

    #[error("Encoding failed: {reason}")]
    Encode { reason: String },
}
