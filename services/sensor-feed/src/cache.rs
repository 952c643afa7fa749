//! Freshness cache
//!
//! Holds the latest accepted measurement per sensor source. A reading only
//! replaces the stored one when its `recorded` instant is strictly later, so
//! the stored timestamp per source never moves backwards.
//!
//! All access goes through a single map-wide reader/writer lock: `upsert`
//! takes it exclusively for one read-modify-write, `snapshot` and `get` share
//! it. The lock is never held across I/O or bus operations.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use types::ids::SourceId;
use types::measurement::Measurement;

/// Outcome of offering a measurement to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First sighting of the source; entry created.
    Inserted,
    /// Strictly newer reading; entry replaced.
    Updated,
    /// Same or older reading; cache unchanged.
    Stale,
}

impl Decision {
    /// Whether the cache changed and the record should be propagated.
    pub fn is_change(&self) -> bool {
        !matches!(self, Decision::Stale)
    }
}

/// Shared handle to the freshness cache.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Clone, Default)]
pub struct FreshnessCache {
    entries: Arc<RwLock<BTreeMap<SourceId, Measurement>>>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a measurement, keeping it only if it is fresher than the stored one.
    ///
    /// Ties on `recorded` favour the existing entry.
    pub fn upsert(&self, measurement: &Measurement) -> Decision {
        let mut entries = self.entries.write();

        match entries.entry(measurement.source.clone()) {
            Entry::Vacant(slot) => {
                info!(source = %measurement.source, "No data for source, creating entry");
                slot.insert(measurement.clone());
                Decision::Inserted
            }
            Entry::Occupied(mut slot) => {
                if measurement.is_newer_than(slot.get()) {
                    debug!(
                        source = %measurement.source,
                        previous = %slot.get().recorded,
                        recorded = %measurement.recorded,
                        "New data for source"
                    );
                    slot.insert(measurement.clone());
                    Decision::Updated
                } else {
                    debug!(
                        source = %measurement.source,
                        stored = %slot.get().recorded,
                        offered = %measurement.recorded,
                        "Ignoring stale reading"
                    );
                    Decision::Stale
                }
            }
        }
    }

    /// Point-in-time copy of every entry, keyed by source.
    pub fn snapshot(&self) -> BTreeMap<SourceId, Measurement> {
        self.entries.read().clone()
    }

    /// Latest reading for one source, if seen.
    pub fn get(&self, source: &SourceId) -> Option<Measurement> {
        self.entries.read().get(source).cloned()
    }

    /// Number of distinct sources seen.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
