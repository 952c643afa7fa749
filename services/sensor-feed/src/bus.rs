//! Broadcast bus for changed measurements
//!
//! One fixed topic for the whole cache. The poller publishes every inserted
//! or updated record; each subscriber receives the records published after it
//! registered, in publish order, through its own bounded queue.
//!
//! `BroadcastBus` and `RecordReceiver` are the seams a different transport
//! plugs into; stream sessions only depend on the traits.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use types::errors::PublishError;
use types::measurement::Measurement;

use crate::backpressure::{BackpressureAction, BackpressureConfig, Enqueued, SubscriberQueue};
use crate::metrics::FeedMetrics;

/// Unique subscriber identifier.
pub type SubscriberId = u64;

/// Item yielded to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// A changed measurement.
    Record(Measurement),
    /// Number of older records dropped because this subscriber fell behind.
    Lagged(u64),
}

/// Receiving end of one subscription.
#[async_trait]
pub trait RecordReceiver: Send {
    fn id(&self) -> SubscriberId;

    /// Next item, or `None` once the subscription has been closed.
    async fn recv(&mut self) -> Option<Received>;
}

/// Publish/subscribe channel carrying changed measurements.
pub trait BroadcastBus: Send + Sync {
    type Receiver: RecordReceiver + 'static;

    /// Deliver to every current subscriber. Returns how many received it.
    fn publish(&self, measurement: Measurement) -> Result<usize, PublishError>;

    /// Register a receiver for records published from now on.
    fn subscribe(&self) -> Self::Receiver;

    /// Stop delivery to a subscriber. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriberId);

    fn subscriber_count(&self) -> usize;
}

/// Per-subscriber queue plus its wake-up signal.
struct Mailbox {
    queue: Mutex<SubscriberQueue>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(config: &BackpressureConfig) -> Self {
        Self {
            queue: Mutex::new(SubscriberQueue::new(config.queue_capacity, config.drop_policy)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn deliver(&self, measurement: Measurement) -> Result<Enqueued, BackpressureAction> {
        let outcome = self.queue.lock().enqueue(measurement)?;
        self.notify.notify_one();
        Ok(outcome)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_lagging(&self) -> bool {
        self.queue.lock().is_lagging()
    }

    /// Pending lag is reported before the records that survived it.
    fn try_take(&self) -> Option<Received> {
        let mut queue = self.queue.lock();
        let lagged = queue.take_unreported_drops();
        if lagged > 0 {
            return Some(Received::Lagged(lagged));
        }
        queue.pop().map(Received::Record)
    }
}

struct BusInner {
    subscribers: Mutex<BTreeMap<SubscriberId, Arc<Mailbox>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    config: BackpressureConfig,
    metrics: Arc<FeedMetrics>,
}

impl BusInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id);
        match removed {
            Some(mailbox) => {
                mailbox.close();
                debug!(subscriber = id, "Subscriber removed");
                true
            }
            None => false,
        }
    }
}

/// In-process broadcast bus with bounded per-subscriber queues.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct InProcessBus {
    inner: Arc<BusInner>,
}

impl InProcessBus {
    pub fn new(config: BackpressureConfig, metrics: Arc<FeedMetrics>) -> Self {
        info!(
            queue_capacity = config.queue_capacity,
            drop_policy = ?config.drop_policy,
            "Broadcast bus initialized"
        );

        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                config,
                metrics,
            }),
        }
    }

    /// Create a bus with default queue configuration and private metrics.
    pub fn with_defaults() -> Self {
        Self::new(BackpressureConfig::default(), Arc::new(FeedMetrics::new()))
    }

    /// Close the bus: every subscription drains and ends, later publishes fail.
    pub fn close(&self) {
        let drained = {
            let mut subscribers = self.inner.subscribers.lock();
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *subscribers)
        };
        for mailbox in drained.values() {
            mailbox.close();
        }
        info!(subscribers = drained.len(), "Broadcast bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Subscribers whose queue filled up and has not yet drained below half.
    pub fn lagging_subscribers(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .values()
            .filter(|mailbox| mailbox.is_lagging())
            .count()
    }
}

impl BroadcastBus for InProcessBus {
    type Receiver = Subscription;

    fn publish(&self, measurement: Measurement) -> Result<usize, PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }

        let mut subscribers = self.inner.subscribers.lock();
        let mut reached = 0;
        let mut to_disconnect = Vec::new();

        for (id, mailbox) in subscribers.iter() {
            match mailbox.deliver(measurement.clone()) {
                Ok(Enqueued::Queued) => reached += 1,
                Ok(Enqueued::DroppedOldest) => {
                    reached += 1;
                    self.inner.metrics.record_lag_drop();
                }
                Err(BackpressureAction::DisconnectSubscriber) => to_disconnect.push(*id),
            }
        }

        for id in to_disconnect {
            if let Some(mailbox) = subscribers.remove(&id) {
                mailbox.close();
                self.inner.metrics.record_subscriber_disconnected();
                warn!(subscriber = id, "Backpressure: disconnecting lagging subscriber");
            }
        }

        Ok(reached)
    }

    fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new(&self.inner.config));

        let mut subscribers = self.inner.subscribers.lock();
        if self.is_closed() {
            mailbox.close();
        } else {
            subscribers.insert(id, Arc::clone(&mailbox));
            debug!(subscriber = id, "Subscriber registered");
        }
        drop(subscribers);

        Subscription {
            id,
            mailbox,
            bus: Arc::downgrade(&self.inner),
        }
    }

    fn unsubscribe(&self, id: SubscriberId) {
        self.inner.remove(id);
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// A registered receiver on an [`InProcessBus`].
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriberId,
    mailbox: Arc<Mailbox>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Take the next queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Received> {
        self.mailbox.try_take()
    }
}

#[async_trait]
impl RecordReceiver for Subscription {
    fn id(&self) -> SubscriberId {
        self.id
    }

    async fn recv(&mut self) -> Option<Received> {
        let mailbox = Arc::clone(&self.mailbox);
        loop {
            // Register interest before checking so a concurrent delivery
            // cannot slip between the check and the wait.
            let notified = mailbox.notify.notified();

            if let Some(item) = mailbox.try_take() {
                return Some(item);
            }
            if mailbox.is_closed() {
                return None;
            }

            notified.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
