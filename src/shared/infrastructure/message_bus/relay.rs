// Bounded publish queue and the relay that drains it.
//
// Purpose
// - Keep bus latency and failures off the request path.
//
// Responsibilities
// - `QueuedPublisher` never waits: a full or closed queue is reported to the
//   caller as a `PublishError`.
// - `NotificationRelay` forwards queued messages to the `MessageBus` and
//   records every outcome in `DeliveryReports`.

use crate::shared::core::primitives::now_millis;
use crate::shared::infrastructure::message_bus::{
    BusMessage, EventPublisher, MessageBus, PublishError,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};

pub struct QueuedPublisher {
    tx: mpsc::Sender<BusMessage>,
    capacity: usize,
}

impl QueuedPublisher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BusMessage>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }
}

#[async_trait::async_trait]
impl EventPublisher for QueuedPublisher {
    async fn publish(&self, message: BusMessage) -> Result<(), PublishError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryFailure {
    pub topic: String,
    pub key: String,
    pub error: String,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    pub last_failure: Option<DeliveryFailure>,
}

/// Delivery outcomes of the relay, read by the health endpoint.
#[derive(Default)]
pub struct DeliveryReports {
    delivered: AtomicU64,
    failed: AtomicU64,
    last_failure: Mutex<Option<DeliveryFailure>>,
}

impl DeliveryReports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_failure(&self, failure: DeliveryFailure) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock().await = Some(failure);
    }

    pub async fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().await.clone(),
        }
    }
}

pub struct NotificationRelay {
    rx: mpsc::Receiver<BusMessage>,
    bus: Arc<dyn MessageBus>,
    reports: Arc<DeliveryReports>,
}

impl NotificationRelay {
    pub fn new(
        rx: mpsc::Receiver<BusMessage>,
        bus: Arc<dyn MessageBus>,
        reports: Arc<DeliveryReports>,
    ) -> Self {
        Self { rx, bus, reports }
    }

    /// Forwards one message. Returns `false` once every publisher is gone
    /// and the queue is drained.
    pub async fn relay_next(&mut self) -> bool {
        let Some(message) = self.rx.recv().await else {
            return false;
        };
        let topic = message.topic.clone();
        let key = message.key.clone();
        match self.bus.send(message).await {
            Ok(offset) => {
                tracing::debug!(%topic, %key, offset, "notification delivered");
                self.reports.record_delivered();
            }
            Err(e) => {
                tracing::error!(%topic, %key, error = %e, "notification delivery failed");
                self.reports
                    .record_failure(DeliveryFailure {
                        topic,
                        key,
                        error: e.to_string(),
                        at: now_millis(),
                    })
                    .await;
            }
        }
        true
    }

    pub async fn run(mut self) {
        tracing::info!("notification relay started");
        while self.relay_next().await {}
        tracing::info!("notification relay stopped: publish queue closed");
    }
}
