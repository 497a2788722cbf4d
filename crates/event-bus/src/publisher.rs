use async_trait::async_trait;

use crate::{EventEnvelope, IntegrationEvent, Result};

/// Outbound port for publishing events to the bus.
///
/// Transports are expected to deliver at least once and to keep events that
/// share a partition key in publish order.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an already-encoded envelope.
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;
}

/// Extension trait providing typed publishing on top of [`EventPublisher`].
#[async_trait]
pub trait EventPublisherExt: EventPublisher {
    /// Encodes and publishes a single integration event.
    async fn publish_event(&self, event: &IntegrationEvent) -> Result<()> {
        let envelope = event.to_envelope()?;
        tracing::debug!(
            topic = %envelope.topic,
            partition_key = %envelope.partition_key,
            event_id = %envelope.event_id,
            "Publishing event"
        );
        self.publish(envelope).await
    }

    /// Publishes events in order, stopping at the first failure.
    async fn publish_all(&self, events: &[IntegrationEvent]) -> Result<()> {
        for event in events {
            self.publish_event(event).await?;
        }
        Ok(())
    }
}

// Blanket implementation for all EventPublisher implementations
impl<T: EventPublisher + ?Sized> EventPublisherExt for T {}
