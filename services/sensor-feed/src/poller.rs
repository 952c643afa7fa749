//! Ingestion poller
//!
//! Runs `Fetching -> Idle(delay) -> Fetching` until cancelled. Each cycle
//! fetches one batch, offers every record to the freshness cache in provider
//! order and publishes the ones that changed the cache. A failed fetch skips
//! the cycle; the next attempt happens after the same fixed delay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::errors::FeedError;

use crate::bus::BroadcastBus;
use crate::cache::{Decision, FreshnessCache};
use crate::metrics::FeedMetrics;
use crate::source::MeasurementSource;

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Fixed delay between the end of one cycle and the next fetch.
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Summary of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub stale: usize,
    pub published: usize,
}

/// Periodic fetch-and-upsert loop.
pub struct Poller<S, B> {
    source: S,
    cache: FreshnessCache,
    bus: Arc<B>,
    metrics: Arc<FeedMetrics>,
    config: PollerConfig,
}

impl<S, B> Poller<S, B>
where
    S: MeasurementSource,
    B: BroadcastBus,
{
    pub fn new(
        source: S,
        cache: FreshnessCache,
        bus: Arc<B>,
        metrics: Arc<FeedMetrics>,
        config: PollerConfig,
    ) -> Self {
        Self {
            source,
            cache,
            bus,
            metrics,
            config,
        }
    }

    /// Run one fetch/upsert/publish cycle without sleeping.
    pub async fn poll_once(&self) -> Result<CycleReport, FeedError> {
        let started = Instant::now();
        let batch = match self.source.fetch_batch().await {
            Ok(batch) => batch,
            Err(err) => {
                self.metrics.record_poll_failed(err.is_decode());
                return Err(err);
            }
        };
        self.metrics
            .record_poll_succeeded(started.elapsed().as_micros() as u64);

        let mut report = CycleReport {
            received: batch.len(),
            ..CycleReport::default()
        };

        for measurement in batch {
            let decision = self.cache.upsert(&measurement);
            self.metrics.record_decision(decision);

            match decision {
                Decision::Inserted => report.inserted += 1,
                Decision::Updated => report.updated += 1,
                Decision::Stale => {
                    report.stale += 1;
                    continue;
                }
            }

            let source = measurement.source.clone();
            match self.bus.publish(measurement) {
                Ok(receivers) => {
                    report.published += 1;
                    self.metrics.record_published();
                    debug!(source = %source, receivers, "Published measurement");
                }
                Err(err) => {
                    // The cache stays authoritative; notification is best-effort.
                    self.metrics.record_publish_failure();
                    warn!(source = %source, error = %err, "Couldn't publish measurement");
                }
            }
        }

        Ok(report)
    }

    /// Poll until `cancel` fires.
    ///
    /// An in-flight fetch or sleep is abandoned as soon as cancellation is
    /// requested; a batch is never half-applied because upserts happen only
    /// after the fetch completes.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Poller started"
        );

        while !cancel.is_cancelled() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(report) => debug!(
                        received = report.received,
                        inserted = report.inserted,
                        updated = report.updated,
                        stale = report.stale,
                        "Poll cycle complete"
                    ),
                    Err(err) => warn!(error = %err, "Couldn't fetch measurements, skipping cycle"),
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InProcessBus, RecordReceiver, Received};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use types::errors::PublishError;
    use types::ids::SourceId;
    use types::measurement::Measurement;

    /// Replays a fixed list of fetch results, then returns empty batches.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<Measurement>, FeedError>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<Measurement>, FeedError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl MeasurementSource for ScriptedSource {
        async fn fetch_batch(&self) -> Result<Vec<Measurement>, FeedError> {
            *self.calls.lock() += 1;
            self.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn reading(source: &str, secs: i64, pm2_5: f64) -> Measurement {
        Measurement {
            sensor: "SDS011".to_string(),
            source: SourceId::from(source),
            pm1_0: 1.0,
            pm2_5,
            pm10: 10.0,
            latitude: -25.28,
            longitude: -57.63,
            recorded: Utc.timestamp_opt(1_709_294_400 + secs, 0).unwrap(),
        }
    }

    fn poller(
        script: Vec<Result<Vec<Measurement>, FeedError>>,
    ) -> (Poller<ScriptedSource, InProcessBus>, FreshnessCache, Arc<InProcessBus>, Arc<FeedMetrics>) {
        let cache = FreshnessCache::new();
        let bus = Arc::new(InProcessBus::with_defaults());
        let metrics = Arc::new(FeedMetrics::new());
        let poller = Poller::new(
            ScriptedSource::new(script),
            cache.clone(),
            Arc::clone(&bus),
            Arc::clone(&metrics),
            PollerConfig::default(),
        );
        (poller, cache, bus, metrics)
    }

    #[tokio::test]
    async fn test_first_sighting_is_published() {
        let (poller, cache, bus, _) = poller(vec![Ok(vec![reading("A", 0, 5.0)])]);
        let mut sub = bus.subscribe();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.published, 1);
        assert_eq!(cache.len(), 1);
        assert!(matches!(sub.try_recv(), Some(Received::Record(m)) if m.pm2_5 == 5.0));
    }

    #[tokio::test]
    async fn test_same_timestamp_keeps_first_and_does_not_broadcast() {
        let (poller, cache, bus, _) = poller(vec![
            Ok(vec![reading("A", 0, 5.0)]),
            Ok(vec![reading("A", 0, 9.0)]),
        ]);

        poller.poll_once().await.unwrap();
        let mut sub = bus.subscribe();
        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(report.published, 0);
        assert_eq!(cache.get(&SourceId::from("A")).unwrap().pm2_5, 5.0);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_newer_reading_broadcasts_exactly_once() {
        let (poller, cache, bus, _) = poller(vec![
            Ok(vec![reading("A", 0, 5.0)]),
            Ok(vec![reading("A", 60, 7.0)]),
        ]);

        poller.poll_once().await.unwrap();
        let mut sub = bus.subscribe();
        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.updated, 1);
        let stored = cache.get(&SourceId::from("A")).unwrap();
        assert_eq!(stored.pm2_5, 7.0);
        assert_eq!(sub.try_recv(), Some(Received::Record(reading("A", 60, 7.0))));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_batch_processed_in_provider_order() {
        let (poller, cache, bus, _) = poller(vec![Ok(vec![
            reading("A", 10, 1.0),
            reading("A", 5, 2.0),
            reading("B", 0, 3.0),
            reading("A", 20, 4.0),
        ])]);
        let mut sub = bus.subscribe();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(
            report,
            CycleReport {
                received: 4,
                inserted: 2,
                updated: 1,
                stale: 1,
                published: 3,
            }
        );
        let order: Vec<f64> = std::iter::from_fn(|| match sub.try_recv() {
            Some(Received::Record(m)) => Some(m.pm2_5),
            _ => None,
        })
        .collect();
        assert_eq!(order, vec![1.0, 3.0, 4.0]);
        assert_eq!(cache.get(&SourceId::from("A")).unwrap().pm2_5, 4.0);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let (poller, cache, _, metrics) = poller(vec![
            Err(FeedError::Fetch {
                reason: "connection reset".to_string(),
            }),
            Err(FeedError::Decode {
                reason: "expected array".to_string(),
            }),
        ]);

        assert!(poller.poll_once().await.is_err());
        assert!(poller.poll_once().await.is_err());

        assert!(cache.is_empty());
        let exported = metrics.export();
        assert_eq!(exported["polls_failed_fetch"], 1);
        assert_eq!(exported["polls_failed_decode"], 1);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_cache_update() {
        let (poller, cache, bus, metrics) = poller(vec![Ok(vec![reading("A", 0, 5.0)])]);
        bus.close();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.published, 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(metrics.export()["publish_failures"], 1);
        assert_eq!(bus.publish(reading("B", 0, 1.0)), Err(PublishError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_after_failure_with_fixed_delay() {
        let (poller, cache, bus, _) = poller(vec![
            Err(FeedError::UpstreamStatus { status: 502 }),
            Ok(vec![reading("A", 0, 5.0)]),
        ]);
        let calls = Arc::clone(&poller.source.calls);
        let mut sub = bus.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));

        // The first cycle fails; the second, one interval later, succeeds.
        let received = sub.recv().await;
        assert!(matches!(received, Some(Received::Record(_))));
        assert_eq!(cache.len(), 1);
        assert_eq!(*calls.lock(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (poller, _, _, _) = poller(Vec::new());
        let calls = Arc::clone(&poller.source.calls);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1_600)).await;
        cancel.cancel();
        handle.await.unwrap();

        let polled = *calls.lock();
        assert!((3..=5).contains(&polled), "polled {} times", polled);

        // No further cycles after cancellation
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*calls.lock(), polled);
    }

    /// Provider that never answers.
    struct HangingSource;

    #[async_trait]
    impl MeasurementSource for HangingSource {
        async fn fetch_batch(&self) -> Result<Vec<Measurement>, FeedError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_run_cancels_inflight_fetch() {
        let cache = FreshnessCache::new();
        let poller = Poller::new(
            HangingSource,
            cache.clone(),
            Arc::new(InProcessBus::with_defaults()),
            Arc::new(FeedMetrics::new()),
            PollerConfig::default(),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok(), "poller kept waiting on the fetch after cancel");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_cancelled() {
        let (poller, _, _, _) = poller(vec![Ok(vec![reading("A", 0, 5.0)])]);
        let calls = Arc::clone(&poller.source.calls);
        let cancel = CancellationToken::new();
        cancel.cancel();

        poller.run(cancel).await;
        assert_eq!(*calls.lock(), 0);
    }
}
