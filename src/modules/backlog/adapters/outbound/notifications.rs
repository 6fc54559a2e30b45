use crate::modules::backlog::core::events::DomainEvent;
use crate::shared::infrastructure::message_bus::{BusMessage, EventPublisher, PublishError};
use uuid::Uuid;

/// Translate an audit event into the bus message published for it.
/// The key is the item id, or a fresh id for the batch reorder event.
pub fn to_bus_message(event: &DomainEvent) -> Result<BusMessage, PublishError> {
    let kind = event.kind();
    let key = event.item_id.unwrap_or_else(Uuid::now_v7).to_string();
    let payload = serde_json::to_value(event).map_err(|e| PublishError::Encoding(e.to_string()))?;
    Ok(BusMessage {
        topic: kind.topic().to_string(),
        key,
        event_type: kind.as_str().to_string(),
        occurred_at: event.timestamp,
        payload,
    })
}

pub async fn publish_event(
    publisher: &dyn EventPublisher,
    event: &DomainEvent,
) -> Result<(), PublishError> {
    publisher.publish(to_bus_message(event)?).await
}
