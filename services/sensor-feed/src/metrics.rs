//! Observability counters for the sensor feed
//!
//! Tracks poll outcomes, cache decisions, broadcast deliveries, subscriber
//! lag and open stream sessions. Exported as a flat map for the gateway's
//! metrics endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::Decision;

/// Core metrics for the sensor feed.
pub struct FeedMetrics {
    // Polling
    pub polls_succeeded: AtomicU64,
    pub polls_failed_fetch: AtomicU64,
    pub polls_failed_decode: AtomicU64,
    pub fetch_latency_us: Mutex<LatencyTracker>,

    // Cache decisions
    pub records_inserted: AtomicU64,
    pub records_updated: AtomicU64,
    pub records_stale: AtomicU64,

    // Broadcasting
    pub records_published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub subscriber_lag_drops: AtomicU64,
    pub subscribers_disconnected: AtomicU64,

    // Stream sessions
    pub active_sessions: AtomicU64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self {
            polls_succeeded: AtomicU64::new(0),
            polls_failed_fetch: AtomicU64::new(0),
            polls_failed_decode: AtomicU64::new(0),
            fetch_latency_us: Mutex::new(LatencyTracker::new(1000)),
            records_inserted: AtomicU64::new(0),
            records_updated: AtomicU64::new(0),
            records_stale: AtomicU64::new(0),
            records_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            subscriber_lag_drops: AtomicU64::new(0),
            subscribers_disconnected: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
        }
    }

    /// Record a successful fetch and its latency.
    pub fn record_poll_succeeded(&self, latency_us: u64) {
        self.polls_succeeded.fetch_add(1, Ordering::Relaxed);
        self.fetch_latency_us.lock().record(latency_us);
    }

    /// Record a failed poll cycle.
    pub fn record_poll_failed(&self, decode: bool) {
        if decode {
            self.polls_failed_decode.fetch_add(1, Ordering::Relaxed);
        } else {
            self.polls_failed_fetch.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of one cache upsert.
    pub fn record_decision(&self, decision: Decision) {
        let counter = match decision {
            Decision::Inserted => &self.records_inserted,
            Decision::Updated => &self.records_updated,
            Decision::Stale => &self.records_stale,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record handed to the bus.
    pub fn record_published(&self) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a publish that the bus refused.
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record evicted from a lagging subscriber's queue.
    pub fn record_lag_drop(&self) {
        self.subscriber_lag_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a subscriber removed by the disconnect policy.
    pub fn record_subscriber_disconnected(&self) {
        self.subscribers_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturating: never wrap below zero.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Export metrics as a BTreeMap for JSON exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("polls_succeeded".to_string(), self.polls_succeeded.load(Ordering::Relaxed));
        m.insert("polls_failed_fetch".to_string(), self.polls_failed_fetch.load(Ordering::Relaxed));
        m.insert("polls_failed_decode".to_string(), self.polls_failed_decode.load(Ordering::Relaxed));
        m.insert("records_inserted".to_string(), self.records_inserted.load(Ordering::Relaxed));
        m.insert("records_updated".to_string(), self.records_updated.load(Ordering::Relaxed));
        m.insert("records_stale".to_string(), self.records_stale.load(Ordering::Relaxed));
        m.insert("records_published".to_string(), self.records_published.load(Ordering::Relaxed));
        m.insert("publish_failures".to_string(), self.publish_failures.load(Ordering::Relaxed));
        m.insert("subscriber_lag_drops".to_string(), self.subscriber_lag_drops.load(Ordering::Relaxed));
        m.insert(
            "subscribers_disconnected".to_string(),
            self.subscribers_disconnected.load(Ordering::Relaxed),
        );
        m.insert("active_sessions".to_string(), self.active_sessions.load(Ordering::Relaxed));

        let latency = self.fetch_latency_us.lock();
        m.insert("fetch_latency_samples".to_string(), latency.count() as u64);
        if let Some(p50) = latency.percentile(50) {
            m.insert("fetch_latency_p50_us".to_string(), p50);
        }
        if let Some(p99) = latency.percentile(99) {
            m.insert("fetch_latency_p99_us".to_string(), p99);
        }
        m
    }
}

impl Default for FeedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Number of samples recorded.
    pub fn count(&self) -> usize {
        self.samples.len()
    }
}
