//! Identifier types for sensor entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one deployed sensor instance
///
/// This is the freshness cache key. Ordering is lexicographic so snapshots
/// keyed by source serialize in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a SourceId from any string-like value
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    /// Get the source string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
