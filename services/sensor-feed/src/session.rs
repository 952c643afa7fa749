//! Stream sessions
//!
//! A session bridges one external connection to the broadcast bus: it owns a
//! subscription, forwards each received record to its sink and ends when the
//! sink fails, the bus closes the subscription, or shutdown is requested.
//! The subscription is released before `run` returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::errors::SinkError;
use types::measurement::Measurement;

use crate::bus::{Received, RecordReceiver};
use crate::metrics::FeedMetrics;

/// Destination for records of one connection.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), SinkError>;

    /// Resolves once the connection is known to be gone.
    ///
    /// Sinks that cannot detect this up front never resolve and are noticed
    /// on the next failed send instead.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

/// Sink that hands records to a channel drained by the connection's writer.
///
/// The send fails once the receiving half is dropped, which is how a closed
/// HTTP response or socket ends the session.
pub struct ChannelSink {
    tx: mpsc::Sender<Measurement>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Measurement>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
        self.tx
            .send(measurement.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection went away or a write failed.
    SinkClosed,
    /// The bus closed the subscription.
    BusClosed,
    /// Shutdown was requested.
    Cancelled,
}

/// Forwards bus records to one connection.
pub struct StreamSession<R> {
    receiver: R,
    metrics: Arc<FeedMetrics>,
}

impl<R: RecordReceiver> StreamSession<R> {
    pub fn new(receiver: R, metrics: Arc<FeedMetrics>) -> Self {
        Self { receiver, metrics }
    }

    /// Forward records until the sink, the bus or `cancel` ends the session.
    pub async fn run<K: EventSink>(self, mut sink: K, cancel: CancellationToken) -> SessionEnd {
        let StreamSession {
            mut receiver,
            metrics,
        } = self;
        let subscriber = receiver.id();

        metrics.session_opened();
        info!(subscriber, "Stream session started");

        let end = loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                _ = sink.closed() => break SessionEnd::SinkClosed,
                received = receiver.recv() => received,
            };

            match received {
                None => break SessionEnd::BusClosed,
                Some(Received::Lagged(missed)) => {
                    warn!(subscriber, missed, "Stream subscriber lagged, oldest records dropped");
                }
                Some(Received::Record(measurement)) => {
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break SessionEnd::Cancelled,
                        sent = sink.send(&measurement) => sent,
                    };
                    if let Err(err) = sent {
                        debug!(subscriber, error = %err, "Stream sink closed");
                        break SessionEnd::SinkClosed;
                    }
                }
            }
        };

        // Unsubscribe before reporting the session as gone.
        drop(receiver);
        metrics.session_closed();
        info!(subscriber, reason = ?end, "Stream session ended");

        end
    }
}
