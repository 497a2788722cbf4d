use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use tokio::sync::{Mutex, RwLock};

use crate::error::{InventoryError, Result};
use crate::ledger;
use crate::model::{
    ReleaseReason, Reservation, ReservationRequest, StockHistory, StockRecord, StockSettings,
};
use crate::store::StockStore;

/// In-memory stock store.
///
/// Each product's record sits behind its own mutex so reservations on
/// different products never contend. Locks are always taken in the order
/// product, reservations, history.
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    stock: Arc<RwLock<HashMap<ProductId, Arc<Mutex<StockRecord>>>>>,
    reservations: Arc<RwLock<Vec<Reservation>>>,
    history: Arc<RwLock<Vec<StockHistory>>>,
    failures: Arc<Mutex<u32>>,
    failing_releases: Arc<Mutex<HashSet<ProductId>>>,
}

impl InMemoryStockStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given on-hand quantities.
    pub async fn with_stock<I, P>(levels: I) -> Self
    where
        I: IntoIterator<Item = (P, u32)>,
        P: Into<ProductId>,
    {
        let store = Self::new();
        for (product_id, quantity) in levels {
            let lock = store.product(&product_id.into()).await;
            lock.lock().await.quantity = quantity;
        }
        store
    }

    /// Makes the next `count` operations fail with a transient error (for testing).
    pub async fn fail_next_operations(&self, count: u32) {
        *self.failures.lock().await = count;
    }

    /// Makes the next release on `product_id` fail with a transient error (for testing).
    pub async fn fail_next_release_of(&self, product_id: impl Into<ProductId>) {
        self.failing_releases.lock().await.insert(product_id.into());
    }

    /// Returns the number of reservations in any status.
    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }

    async fn check_failure(&self) -> Result<()> {
        let mut failures = self.failures.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(InventoryError::TransientPersistence(
                "simulated storage failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the product's lock, creating an empty record if needed.
    async fn product(&self, product_id: &ProductId) -> Arc<Mutex<StockRecord>> {
        if let Some(lock) = self.stock.read().await.get(product_id) {
            return lock.clone();
        }
        self.stock
            .write()
            .await
            .entry(product_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(StockRecord::new(product_id.clone()))))
            .clone()
    }

    async fn existing_product(&self, product_id: &ProductId) -> Option<Arc<Mutex<StockRecord>>> {
        self.stock.read().await.get(product_id).cloned()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn ensure_stock(&self, product_id: &ProductId) -> Result<StockRecord> {
        self.check_failure().await?;
        let lock = self.product(product_id).await;
        let stock = lock.lock().await;
        Ok(stock.clone())
    }

    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        self.check_failure().await?;
        match self.existing_product(product_id).await {
            Some(lock) => Ok(Some(lock.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn update_settings(
        &self,
        product_id: &ProductId,
        settings: StockSettings,
    ) -> Result<StockRecord> {
        self.check_failure().await?;
        let lock = self.product(product_id).await;
        let mut stock = lock.lock().await;
        stock.reorder_level = settings.reorder_level;
        stock.max_stock = settings.max_stock;
        stock.is_active = settings.is_active;
        stock.updated_at = Utc::now();
        Ok(stock.clone())
    }

    async fn reserve(&self, request: &ReservationRequest) -> Result<Reservation> {
        self.check_failure().await?;
        let lock = self.product(&request.product_id).await;
        let mut stock = lock.lock().await;
        let mut reservations = self.reservations.write().await;

        if let Some(existing) = reservations.iter().find(|r| {
            r.is_active() && r.product_id == request.product_id && r.order_id == request.order_id
        }) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let before = stock.clone();
        ledger::reserve(&mut stock, request.quantity, now)?;

        let reservation = Reservation::new(request, now);
        reservations.push(reservation.clone());
        self.history.write().await.push(StockHistory::between(
            &before,
            &stock,
            "reservation",
            Some(&request.order_id),
        ));

        Ok(reservation)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        order_id: &OrderId,
        reason: ReleaseReason,
    ) -> Result<Option<Reservation>> {
        self.check_failure().await?;
        if self.failing_releases.lock().await.remove(product_id) {
            return Err(InventoryError::TransientPersistence(format!(
                "simulated failure releasing {product_id}"
            )));
        }
        let Some(lock) = self.existing_product(product_id).await else {
            return Ok(None);
        };
        let mut stock = lock.lock().await;
        let mut reservations = self.reservations.write().await;

        let Some(reservation) = reservations
            .iter_mut()
            .find(|r| r.is_active() && &r.product_id == product_id && &r.order_id == order_id)
        else {
            return Ok(None);
        };

        let before = stock.clone();
        ledger::release(&mut stock, reservation, reason, Utc::now());
        self.history.write().await.push(StockHistory::between(
            &before,
            &stock,
            format!("release:{reason}"),
            Some(order_id),
        ));

        Ok(Some(reservation.clone()))
    }

    async fn complete_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        self.check_failure().await?;
        let mut product_ids: Vec<ProductId> = self
            .reservations
            .read()
            .await
            .iter()
            .filter(|r| r.is_active() && &r.order_id == order_id)
            .map(|r| r.product_id.clone())
            .collect();
        product_ids.sort();
        product_ids.dedup();

        let mut completed = Vec::new();
        for product_id in product_ids {
            let lock = self.product(&product_id).await;
            let mut stock = lock.lock().await;
            let mut reservations = self.reservations.write().await;

            // Re-check under the lock: a concurrent release may have won.
            for reservation in reservations
                .iter_mut()
                .filter(|r| r.is_active() && r.product_id == product_id && &r.order_id == order_id)
            {
                let before = stock.clone();
                if ledger::complete(&mut stock, reservation, Utc::now()) {
                    self.history.write().await.push(StockHistory::between(
                        &before,
                        &stock,
                        "completion",
                        Some(order_id),
                    ));
                    completed.push(reservation.clone());
                }
            }
        }

        Ok(completed)
    }

    async fn adjust(
        &self,
        product_id: &ProductId,
        delta: i64,
        reason: &str,
    ) -> Result<StockRecord> {
        self.check_failure().await?;
        let lock = self.product(product_id).await;
        let mut stock = lock.lock().await;

        let before = stock.clone();
        ledger::adjust(&mut stock, delta, Utc::now())?;
        self.history
            .write()
            .await
            .push(StockHistory::between(&before, &stock, reason, None));

        Ok(stock.clone())
    }

    async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        self.check_failure().await?;
        Ok(self
            .reservations
            .read()
            .await
            .iter()
            .filter(|r| &r.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        self.check_failure().await?;
        Ok(self
            .reservations
            .read()
            .await
            .iter()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        self.check_failure().await?;
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|h| &h.product_id == product_id)
            .cloned()
            .collect())
    }
}
