// Consumer-group reader for the message bus.
//
// - One message at a time per topic, in offset order.
// - The offset is committed only after the handler returns Ok.
// - A handler error is logged and the reader moves past the message without
//   committing; nothing is retried or dead-lettered.

use crate::shared::infrastructure::message_bus::{BusError, BusMessage, MessageBus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &BusMessage) -> anyhow::Result<()>;
}

pub struct EventConsumer {
    bus: Arc<dyn MessageBus>,
    group: String,
    topics: Vec<String>,
    handler: Arc<dyn MessageHandler>,
    poll_interval: Duration,
    positions: HashMap<String, u64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub handled: usize,
    pub failed: usize,
}

impl EventConsumer {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        group: impl Into<String>,
        topics: Vec<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            bus,
            group: group.into(),
            topics,
            handler,
            poll_interval: Duration::from_millis(100),
            positions: HashMap::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Drains every subscribed topic up to its current end.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, BusError> {
        let mut outcome = PollOutcome::default();
        for topic in self.topics.clone() {
            let mut position = match self.positions.get(&topic) {
                Some(position) => *position,
                None => self.bus.committed(&topic, &self.group).await?,
            };
            while let Some(message) = self.bus.fetch(&topic, position).await? {
                match self.handler.handle(&message).await {
                    Ok(()) => {
                        self.bus.commit(&topic, &self.group, position + 1).await?;
                        outcome.handled += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            group = %self.group,
                            %topic,
                            offset = position,
                            key = %message.key,
                            error = %e,
                            "message handler failed, skipping"
                        );
                        outcome.failed += 1;
                    }
                }
                position += 1;
            }
            self.positions.insert(topic, position);
        }
        Ok(outcome)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(group = %self.group, topics = ?self.topics, "consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.poll_once().await {
                tracing::error!(group = %self.group, error = %e, "consumer poll failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(group = %self.group, "consumer stopped");
    }
}

/// Logs every notification at debug level. Used as the default subscriber.
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(&self, message: &BusMessage) -> anyhow::Result<()> {
        tracing::debug!(
            topic = %message.topic,
            key = %message.key,
            event_type = %message.event_type,
            "notification received"
        );
        Ok(())
    }
}

#[cfg(test)]
mod event_consumer_tests {
    use super::*;
    use crate::shared::infrastructure::message_bus::in_memory::InMemoryMessageBus;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use tokio::sync::Mutex;

    const TOPIC: &str = "item.updated";
    const GROUP: &str = "audit";

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: &BusMessage) -> anyhow::Result<()> {
            if self.fail_on.as_deref() == Some(message.key.as_str()) {
                anyhow::bail!("cannot handle {}", message.key);
            }
            self.seen.lock().await.push(message.key.clone());
            Ok(())
        }
    }

    fn message(key: &str) -> BusMessage {
        BusMessage {
            topic: TOPIC.to_string(),
            key: key.to_string(),
            event_type: "ITEM_UPDATED".to_string(),
            occurred_at: 0,
            payload: json!({}),
        }
    }

    #[fixture]
    async fn before_each() -> Arc<InMemoryMessageBus> {
        let bus = Arc::new(InMemoryMessageBus::new());
        for key in ["a", "b", "c"] {
            bus.send(message(key)).await.unwrap();
        }
        bus
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_handle_in_order_and_commit(
        #[future] before_each: Arc<InMemoryMessageBus>,
    ) {
        let bus = before_each.await;
        let handler = Arc::new(RecordingHandler::default());
        let mut consumer =
            EventConsumer::new(bus.clone(), GROUP, vec![TOPIC.to_string()], handler.clone());

        let outcome = consumer.poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome { handled: 3, failed: 0 });
        assert_eq!(*handler.seen.lock().await, vec!["a", "b", "c"]);
        assert_eq!(bus.committed(TOPIC, GROUP).await.unwrap(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_skip_a_failing_message_without_committing_it(
        #[future] before_each: Arc<InMemoryMessageBus>,
    ) {
        let bus = before_each.await;
        let handler = Arc::new(RecordingHandler {
            fail_on: Some("c".to_string()),
            ..Default::default()
        });
        let mut consumer =
            EventConsumer::new(bus.clone(), GROUP, vec![TOPIC.to_string()], handler.clone());

        let outcome = consumer.poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome { handled: 2, failed: 1 });
        assert_eq!(*handler.seen.lock().await, vec!["a", "b"]);
        assert_eq!(bus.committed(TOPIC, GROUP).await.unwrap(), 2);

        bus.send(message("d")).await.unwrap();
        let outcome = consumer.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome { handled: 1, failed: 0 });
        assert_eq!(bus.committed(TOPIC, GROUP).await.unwrap(), 4);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_resume_from_the_committed_offset(
        #[future] before_each: Arc<InMemoryMessageBus>,
    ) {
        let bus = before_each.await;
        bus.commit(TOPIC, GROUP, 2).await.unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let mut consumer =
            EventConsumer::new(bus.clone(), GROUP, vec![TOPIC.to_string()], handler.clone());

        consumer.poll_once().await.unwrap();

        assert_eq!(*handler.seen.lock().await, vec!["c"]);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_stop_when_shutdown_is_signalled(
        #[future] before_each: Arc<InMemoryMessageBus>,
    ) {
        let bus = before_each.await;
        let handler = Arc::new(RecordingHandler::default());
        let consumer = EventConsumer::new(bus, GROUP, vec![TOPIC.to_string()], handler.clone())
            .with_poll_interval(Duration::from_millis(5));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(consumer.run(rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(handler.seen.lock().await.len(), 3);
    }
}
