//! Backpressure and flow control for subscriber delivery
//!
//! Each subscriber owns a bounded outbound queue. When a subscriber cannot
//! keep up, the queue applies its drop policy so that the single publisher
//! (the ingestion poller) is never stalled by one slow consumer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use types::measurement::Measurement;

/// Drop policy when a subscriber's queue overflows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Disconnect the lagging subscriber immediately.
    Disconnect,
    /// Drop oldest records to make room for newer ones.
    #[default]
    DropOldest,
}

/// Outcome of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Record queued without loss.
    Queued,
    /// Record queued after evicting the oldest queued record.
    DroppedOldest,
}

/// Action to take when backpressure is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackpressureAction {
    /// Subscriber should be disconnected.
    DisconnectSubscriber,
}

/// Per-subscriber outbound queue with bounded capacity.
#[derive(Debug)]
pub struct SubscriberQueue {
    records: VecDeque<Measurement>,
    capacity: usize,
    drop_policy: DropPolicy,
    /// Records dropped since the subscriber last observed lag.
    unreported_drops: u64,
    /// Whether this subscriber is marked as lagging.
    is_lagging: bool,
}

impl SubscriberQueue {
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            drop_policy,
            unreported_drops: 0,
            is_lagging: false,
        }
    }

    /// Enqueue a record. Returns Err if the subscriber should be disconnected.
    pub fn enqueue(&mut self, record: Measurement) -> Result<Enqueued, BackpressureAction> {
        let mut outcome = Enqueued::Queued;

        if self.records.len() >= self.capacity {
            self.is_lagging = true;

            match self.drop_policy {
                DropPolicy::Disconnect => {
                    return Err(BackpressureAction::DisconnectSubscriber);
                }
                DropPolicy::DropOldest => {
                    self.records.pop_front();
                    self.unreported_drops += 1;
                    outcome = Enqueued::DroppedOldest;
                }
            }
        }

        self.records.push_back(record);

        // Clear lagging flag once the queue is below half capacity
        if self.records.len() < self.capacity / 2 {
            self.is_lagging = false;
        }

        Ok(outcome)
    }

    /// Pop the oldest queued record.
    pub fn pop(&mut self) -> Option<Measurement> {
        let record = self.records.pop_front();
        if self.records.len() < self.capacity / 2 {
            self.is_lagging = false;
        }
        record
    }

    /// Take the number of records dropped since the last call.
    pub fn take_unreported_drops(&mut self) -> u64 {
        std::mem::take(&mut self.unreported_drops)
    }

    /// Number of records currently queued.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this subscriber is currently lagging.
    pub fn is_lagging(&self) -> bool {
        self.is_lagging
    }
}

/// Configuration for subscriber queues.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// Maximum queue size per subscriber.
    pub queue_capacity: usize,
    /// Drop policy on overflow.
    pub drop_policy: DropPolicy,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            drop_policy: DropPolicy::DropOldest,
        }
    }
}
