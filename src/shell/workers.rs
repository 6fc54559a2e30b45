use crate::modules::backlog::core::events::EventKind;
use crate::shared::infrastructure::message_bus::MessageBus;
use crate::shared::infrastructure::message_bus::consumer::{EventConsumer, LoggingHandler};
use crate::shared::infrastructure::message_bus::relay::NotificationRelay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const AUDIT_CONSUMER_GROUP: &str = "backlog-notifications-log";

const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Background tasks: the notification relay and the bus consumer.
pub struct Workers {
    shutdown: watch::Sender<bool>,
    relay: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl Workers {
    pub fn spawn(relay: NotificationRelay, bus: Arc<dyn MessageBus>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let topics = EventKind::ALL
            .iter()
            .map(|kind| kind.topic().to_string())
            .collect();
        let consumer = EventConsumer::new(bus, AUDIT_CONSUMER_GROUP, topics, Arc::new(LoggingHandler));

        Self {
            shutdown,
            relay: tokio::spawn(relay.run()),
            consumer: tokio::spawn(consumer.run(shutdown_rx)),
        }
    }

    /// Stops the consumer and waits for the relay to drain. The relay only
    /// finishes once every publisher has been dropped.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.consumer.await {
            tracing::warn!(error = %e, "consumer task ended abnormally");
        }
        match tokio::time::timeout(RELAY_DRAIN_TIMEOUT, self.relay).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "relay task ended abnormally"),
            Err(_) => tracing::warn!("relay still draining at shutdown, abandoning it"),
        }
    }
}
