//! Snapshot reader
//!
//! Read-only query path over the freshness cache. Each call copies the cache
//! under its shared lock and serializes after the lock is released, so a
//! query never holds up the poller for longer than the copy.

use std::collections::BTreeMap;

use tracing::error;
use types::errors::SnapshotError;
use types::ids::SourceId;
use types::measurement::Measurement;

use crate::cache::FreshnessCache;

#[derive(Clone)]
pub struct SnapshotReader {
    cache: FreshnessCache,
}

impl SnapshotReader {
    pub fn new(cache: FreshnessCache) -> Self {
        Self { cache }
    }

    /// Every source's latest reading.
    pub fn read(&self) -> BTreeMap<SourceId, Measurement> {
        self.cache.snapshot()
    }

    /// Latest reading of one source.
    pub fn read_one(&self, source: &SourceId) -> Option<Measurement> {
        self.cache.get(source)
    }

    /// Snapshot as a JSON object mapping source to measurement.
    pub fn read_json(&self) -> Result<Vec<u8>, SnapshotError> {
        let snapshot = self.read();
        serde_json::to_vec(&snapshot).map_err(|e| {
            error!(error = %e, sources = snapshot.len(), "Couldn't serialize snapshot");
            SnapshotError::Serialization {
                reason: e.to_string(),
            }
        })
    }

    /// Number of sources currently held.
    pub fn source_count(&self) -> usize {
        self.cache.len()
    }
}
