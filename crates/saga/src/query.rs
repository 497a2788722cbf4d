//! Read-only port onto the ordering service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use event_bus::LineItem;
use tokio::sync::RwLock;

use crate::error::Result;

/// What the ordering service knows about an order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSummary {
    pub customer_id: Option<CustomerId>,
    pub total_amount: Option<Money>,
    pub items: Vec<LineItem>,
}

/// Synchronous lookup used to fill gaps in incoming payloads.
#[async_trait]
pub trait OrderQuery: Send + Sync {
    async fn order_summary(&self, order_id: &OrderId) -> Result<Option<OrderSummary>>;
}

/// In-memory order query for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderQuery {
    summaries: Arc<RwLock<HashMap<OrderId, OrderSummary>>>,
}

impl InMemoryOrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the summary returned for an order.
    pub async fn insert(&self, order_id: OrderId, summary: OrderSummary) {
        self.summaries.write().await.insert(order_id, summary);
    }
}

#[async_trait]
impl OrderQuery for InMemoryOrderQuery {
    async fn order_summary(&self, order_id: &OrderId) -> Result<Option<OrderSummary>> {
        Ok(self.summaries.read().await.get(order_id).cloned())
    }
}
