use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::{OrderError, Result};
use crate::order::Order;

/// Persistence port for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Loads an order.
    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Inserts a new order. Returns false if an order with the id exists.
    async fn insert(&self, order: &Order) -> Result<bool>;

    /// Saves an existing order.
    ///
    /// Fails with [`OrderError::Conflict`] unless the stored version equals
    /// `order.version`. Returns the order with its version bumped.
    async fn save(&self, order: &Order) -> Result<Order>;
}

#[derive(Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, Order>,
    fail_next_saves: u32,
}

/// In-memory order repository for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` saves fail with a transient error (for testing).
    pub async fn fail_next_saves(&self, count: u32) {
        self.state.write().await.fail_next_saves = count;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Ok(false);
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(true)
    }

    async fn save(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.write().await;
        if state.fail_next_saves > 0 {
            state.fail_next_saves -= 1;
            return Err(OrderError::TransientPersistence(
                "simulated storage failure".to_string(),
            ));
        }

        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| OrderError::NotFound(order.id.clone()))?;
        if stored.version != order.version {
            return Err(OrderError::Conflict {
                order_id: order.id.clone(),
                expected: order.version,
                actual: stored.version,
            });
        }

        let mut saved = order.clone();
        saved.version += 1;
        *stored = saved.clone();
        Ok(saved)
    }
}
