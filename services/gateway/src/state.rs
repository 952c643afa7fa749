use std::sync::Arc;

use sensor_feed::bus::InProcessBus;
use sensor_feed::cache::FreshnessCache;
use sensor_feed::metrics::FeedMetrics;
use sensor_feed::snapshot::SnapshotReader;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub reader: SnapshotReader,
    pub bus: Arc<InProcessBus>,
    pub metrics: Arc<FeedMetrics>,
    /// Cancelled on shutdown; stream sessions run on child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        cache: FreshnessCache,
        bus: Arc<InProcessBus>,
        metrics: Arc<FeedMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader: SnapshotReader::new(cache),
            bus,
            metrics,
            shutdown,
        }
    }
}
