use crate::shared::infrastructure::message_bus::{BusError, BusMessage, MessageBus};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Topics {
    logs: HashMap<String, Vec<BusMessage>>,
    offsets: HashMap<(String, String), u64>,
}

#[derive(Default)]
pub struct InMemoryMessageBus {
    inner: RwLock<Topics>,
    is_offline: bool,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&mut self) {
        self.is_offline = !self.is_offline;
    }

    /// Snapshot of everything sent to `topic`, oldest first.
    pub async fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.inner
            .read()
            .await
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), BusError> {
        if self.is_offline {
            return Err(BusError::Backend("Message bus offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn send(&self, message: BusMessage) -> Result<u64, BusError> {
        self.check_online()?;
        let mut guard = self.inner.write().await;
        let log = guard.logs.entry(message.topic.clone()).or_default();
        log.push(message);
        Ok(log.len() as u64 - 1)
    }

    async fn fetch(&self, topic: &str, offset: u64) -> Result<Option<BusMessage>, BusError> {
        self.check_online()?;
        let guard = self.inner.read().await;
        let Some(log) = guard.logs.get(topic) else {
            return Ok(None);
        };
        Ok(usize::try_from(offset)
            .ok()
            .and_then(|index| log.get(index))
            .cloned())
    }

    async fn committed(&self, topic: &str, group: &str) -> Result<u64, BusError> {
        self.check_online()?;
        let guard = self.inner.read().await;
        Ok(guard
            .offsets
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn commit(&self, topic: &str, group: &str, next_offset: u64) -> Result<(), BusError> {
        self.check_online()?;
        let mut guard = self.inner.write().await;
        let end = guard.logs.get(topic).map_or(0, |log| log.len() as u64);
        if next_offset > end {
            return Err(BusError::OffsetOutOfRange {
                topic: topic.to_string(),
                offset: next_offset,
            });
        }
        guard
            .offsets
            .insert((topic.to_string(), group.to_string()), next_offset);
        Ok(())
    }
}
