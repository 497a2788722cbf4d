use event_bus::{EventEnvelope, EventId, IntegrationEvent};
use serde::{Deserialize, Serialize};

/// An outbound event stored with the order that produced it.
///
/// The event id is fixed when the event is staged, so every publish attempt
/// carries the same id and consumers can deduplicate by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvent {
    pub event_id: EventId,
    pub topic: String,
    pub partition_key: String,
    pub payload: serde_json::Value,
}

impl PendingEvent {
    /// Encodes an integration event for later publishing.
    pub fn stage(event: &IntegrationEvent) -> event_bus::Result<Self> {
        let envelope = event.to_envelope()?;
        Ok(Self {
            event_id: envelope.event_id,
            topic: envelope.topic,
            partition_key: envelope.partition_key,
            payload: envelope.payload,
        })
    }

    /// Builds the envelope handed to the publisher.
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id,
            topic: self.topic.clone(),
            partition_key: self.partition_key.clone(),
            timestamp: chrono::Utc::now(),
            payload: self.payload.clone(),
            metadata: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use event_bus::{OrderCompleted, topics};

    #[test]
    fn test_staged_event_keeps_its_id() {
        let event = IntegrationEvent::OrderCompleted(OrderCompleted {
            order_id: OrderId::new("100"),
        });
        let pending = PendingEvent::stage(&event).unwrap();

        let first = pending.to_envelope();
        let second = pending.to_envelope();
        assert_eq!(first.event_id, second.event_id);
        assert_eq!(first.topic, topics::ORDER_COMPLETED);
        assert_eq!(first.partition_key, "100");
        assert_eq!(IntegrationEvent::from_envelope(&first).unwrap(), event);
    }
}
