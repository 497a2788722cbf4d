use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{EventBusError, EventEnvelope, EventPublisher, IntegrationEvent, Result};

/// Receiving end of a bus subscription.
pub type Subscription = mpsc::UnboundedReceiver<EventEnvelope>;

/// In-memory event bus for tests and single-process deployments.
///
/// Every published envelope is fanned out to all current subscribers, each
/// through its own unbounded queue, so a slow subscriber falls behind but
/// never loses events. Ordering is global, which trivially satisfies the
/// per-partition ordering transports must provide.
///
/// A bus built with [`InMemoryEventBus::with_log`] also keeps every envelope
/// for inspection.
#[derive(Clone)]
pub struct InMemoryEventBus {
    log: Option<Arc<RwLock<Vec<EventEnvelope>>>>,
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<EventEnvelope>>>>,
    failures: Arc<RwLock<u32>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus that only fans out.
    pub fn new() -> Self {
        Self {
            log: None,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(0)),
        }
    }

    /// Creates a bus that also records every published envelope.
    pub fn with_log() -> Self {
        Self {
            log: Some(Arc::new(RwLock::new(Vec::new()))),
            ..Self::new()
        }
    }

    /// Subscribes to every envelope published from now on.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }

    /// Makes the next `count` publishes fail (for testing).
    pub async fn fail_next_publishes(&self, count: u32) {
        *self.failures.write().await = count;
    }

    /// Returns every envelope published so far, in publish order.
    ///
    /// Always empty unless the bus was built with [`InMemoryEventBus::with_log`].
    pub async fn published(&self) -> Vec<EventEnvelope> {
        match &self.log {
            Some(log) => log.read().await.clone(),
            None => Vec::new(),
        }
    }

    /// Returns the envelopes published on a single topic.
    pub async fn published_on(&self, topic: &str) -> Vec<EventEnvelope> {
        self.published()
            .await
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect()
    }

    /// Returns the decoded events published on a single topic.
    pub async fn events_on(&self, topic: &str) -> Result<Vec<IntegrationEvent>> {
        self.published_on(topic)
            .await
            .iter()
            .map(IntegrationEvent::from_envelope)
            .collect()
    }

    /// Returns the total number of envelopes recorded.
    pub async fn event_count(&self) -> usize {
        match &self.log {
            Some(log) => log.read().await.len(),
            None => 0,
        }
    }

    /// Clears the publish log.
    pub async fn clear(&self) {
        if let Some(log) = &self.log {
            log.write().await.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        {
            let mut failures = self.failures.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(EventBusError::Publish(format!(
                    "simulated failure publishing to {}",
                    envelope.topic
                )));
            }
        }

        if let Some(log) = &self.log {
            log.write().await.push(envelope.clone());
        }

        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        if subscribers.is_empty() {
            tracing::trace!("Published with no active subscribers");
        }
        Ok(())
    }
}
