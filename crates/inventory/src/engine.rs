//! Reservation engine: the ledger's business operations.

use chrono::Utc;
use common::{CustomerId, OrderId, ProductId};
use event_bus::{
    EventPublisher, EventPublisherExt, IntegrationEvent, InventoryReleased, LineItem,
    UnavailableItem,
};

use crate::error::{InventoryError, Result};
use crate::model::{
    ReleaseReason, Reservation, ReservationRequest, StockHistory, StockRecord, StockSettings,
};
use crate::store::StockStore;

/// Tunables for the reservation engine.
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// How long a reservation holds stock before the sweeper releases it.
    pub reservation_ttl: chrono::Duration,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
        }
    }
}

/// Result of reserving every line of an order.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkReserveOutcome {
    /// Every line is reserved.
    Reserved(Vec<Reservation>),
    /// At least one line could not be reserved; nothing is held.
    Rejected {
        reason: String,
        unavailable_items: Vec<UnavailableItem>,
    },
}

/// Reserves, releases and completes stock on behalf of orders.
pub struct ReservationEngine<S, P>
where
    S: StockStore,
    P: EventPublisher,
{
    store: S,
    publisher: P,
    config: ReservationConfig,
}

impl<S, P> ReservationEngine<S, P>
where
    S: StockStore,
    P: EventPublisher,
{
    /// Creates an engine with the default configuration.
    pub fn new(store: S, publisher: P) -> Self {
        Self::with_config(store, publisher, ReservationConfig::default())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config(store: S, publisher: P, config: ReservationConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the product's stock record, creating it if needed.
    pub async fn ensure_stock(&self, product_id: &ProductId) -> Result<StockRecord> {
        self.store.ensure_stock(product_id).await
    }

    /// Returns the product's stock record if it exists.
    pub async fn stock(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        self.store.get_stock(product_id).await
    }

    /// Reserves units of one product for an order.
    ///
    /// Emitting `inventory.reserved` is left to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: &OrderId,
        customer_id: &CustomerId,
    ) -> Result<Reservation> {
        let request = ReservationRequest {
            product_id: product_id.clone(),
            quantity,
            order_id: order_id.clone(),
            customer_id: customer_id.clone(),
            expires_at: Utc::now() + self.config.reservation_ttl,
        };

        match self.store.reserve(&request).await {
            Ok(reservation) => {
                metrics::counter!("inventory_reservations_total").increment(1);
                tracing::debug!(reservation_id = %reservation.id, "Stock reserved");
                self.warn_if_low(product_id).await;
                Ok(reservation)
            }
            Err(e) => {
                if e.is_business() {
                    metrics::counter!("inventory_reservation_failures_total").increment(1);
                }
                Err(e)
            }
        }
    }

    /// Reserves every line of an order, or nothing.
    ///
    /// Lines for the same product are merged. On the first line that cannot
    /// be reserved, everything reserved by this call is released again and
    /// every unsatisfiable line is reported.
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn bulk_reserve(
        &self,
        items: &[LineItem],
        order_id: &OrderId,
        customer_id: &CustomerId,
    ) -> Result<BulkReserveOutcome> {
        let lines = merge_lines(items);
        let mut reserved = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let err = match self
                .reserve(&line.product_id, line.quantity, order_id, customer_id)
                .await
            {
                Ok(reservation) => {
                    reserved.push(reservation);
                    continue;
                }
                Err(e) => e,
            };

            self.compensate(&reserved, order_id).await?;
            if !err.is_business() {
                return Err(err);
            }

            let available = match &err {
                InventoryError::InsufficientStock { available, .. } => *available,
                _ => self.availability(&line.product_id).await?,
            };
            let mut unavailable_items = vec![UnavailableItem {
                product_id: line.product_id.clone(),
                requested_quantity: line.quantity,
                available_quantity: available,
            }];

            for rest in &lines[index + 1..] {
                let available = self.availability(&rest.product_id).await?;
                if rest.quantity == 0 || available < rest.quantity {
                    unavailable_items.push(UnavailableItem {
                        product_id: rest.product_id.clone(),
                        requested_quantity: rest.quantity,
                        available_quantity: available,
                    });
                }
            }

            tracing::info!(
                unavailable = unavailable_items.len(),
                error = %err,
                "Bulk reservation rejected"
            );
            return Ok(BulkReserveOutcome::Rejected {
                reason: err.to_string(),
                unavailable_items,
            });
        }

        Ok(BulkReserveOutcome::Reserved(reserved))
    }

    /// Releases the order's active reservation on a product and emits
    /// `inventory.released`.
    ///
    /// Fails with [`InventoryError::ReservationNotFound`] when nothing is
    /// active; callers treat that as already done.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        product_id: &ProductId,
        order_id: &OrderId,
        reason: ReleaseReason,
    ) -> Result<Reservation> {
        let reservation = self
            .store
            .release(product_id, order_id, reason)
            .await?
            .ok_or_else(|| InventoryError::ReservationNotFound {
                product_id: product_id.clone(),
                order_id: order_id.clone(),
            })?;

        metrics::counter!("inventory_releases_total", "reason" => reason.as_str()).increment(1);
        tracing::info!(quantity = reservation.quantity, "Reservation released");

        self.publisher
            .publish_event(&IntegrationEvent::InventoryReleased(InventoryReleased {
                product_id: product_id.clone(),
                quantity: reservation.quantity,
                order_id: order_id.clone(),
                reason: reason.as_str().to_string(),
            }))
            .await?;

        Ok(reservation)
    }

    /// Turns every active reservation of the order into a stock deduction.
    #[tracing::instrument(skip(self))]
    pub async fn complete_reservations(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        let completed = self.store.complete_order(order_id).await?;
        tracing::info!(completed = completed.len(), "Reservations completed");
        Ok(completed)
    }

    /// Applies a manual correction to on-hand stock.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: &ProductId,
        delta: i64,
        reason: &str,
    ) -> Result<StockRecord> {
        let stock = self.store.adjust(product_id, delta, reason).await?;

        if stock.exceeds_max_stock() {
            tracing::warn!(
                quantity = stock.quantity,
                max_stock = stock.max_stock,
                "Stock exceeds configured maximum"
            );
        }
        if stock.is_low_stock() {
            tracing::warn!(
                available = stock.available(),
                reorder_level = stock.reorder_level,
                "Low stock"
            );
        }
        Ok(stock)
    }

    /// Replaces the product's operator settings.
    #[tracing::instrument(skip(self))]
    pub async fn configure(
        &self,
        product_id: &ProductId,
        settings: StockSettings,
    ) -> Result<StockRecord> {
        self.store.update_settings(product_id, settings).await
    }

    /// Releases every active reservation past its expiry.
    ///
    /// Returns the number released. Reservations that were completed or
    /// released concurrently are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired_reservations(&self) -> Result<usize> {
        let expired = self.store.expired_reservations(Utc::now()).await?;
        let mut released = 0;

        for reservation in expired {
            match self
                .release(
                    &reservation.product_id,
                    &reservation.order_id,
                    ReleaseReason::OrderCancelled,
                )
                .await
            {
                Ok(_) => {
                    metrics::counter!("inventory_expired_reservations_total").increment(1);
                    released += 1;
                }
                Err(InventoryError::ReservationNotFound { .. }) => {
                    tracing::debug!(
                        reservation_id = %reservation.id,
                        "Expired reservation already settled"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(released)
    }

    /// Returns every reservation made for the order.
    pub async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        self.store.reservations_for_order(order_id).await
    }

    /// Returns the product's audit trail.
    pub async fn history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        self.store.history(product_id).await
    }

    /// Releases everything reserved by a failed bulk reservation.
    ///
    /// Every release is attempted; the first failure is returned afterwards.
    async fn compensate(&self, reserved: &[Reservation], order_id: &OrderId) -> Result<()> {
        let mut released = 0;
        let mut first_error = None;
        for reservation in reserved {
            match self
                .store
                .release(&reservation.product_id, order_id, ReleaseReason::OrderCancelled)
                .await
            {
                Ok(_) => released += 1,
                Err(e) => {
                    tracing::warn!(
                        product_id = %reservation.product_id,
                        error = %e,
                        "Compensating release failed"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        if released > 0 {
            tracing::info!(released, "Compensated partial reservation");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn availability(&self, product_id: &ProductId) -> Result<u32> {
        Ok(self
            .store
            .get_stock(product_id)
            .await?
            .filter(|stock| stock.is_active)
            .map(|stock| stock.available())
            .unwrap_or(0))
    }

    async fn warn_if_low(&self, product_id: &ProductId) {
        match self.store.get_stock(product_id).await {
            Ok(Some(stock)) if stock.is_low_stock() => {
                tracing::warn!(
                    available = stock.available(),
                    reorder_level = stock.reorder_level,
                    "Low stock"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Could not read stock for low-stock check"),
        }
    }
}

/// Merges lines for the same product, keeping first-seen order.
fn merge_lines(items: &[LineItem]) -> Vec<LineItem> {
    let mut merged: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => merged.push(item.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_lines_keeps_order() {
        let merged = merge_lines(&[
            LineItem::new("A", 2),
            LineItem::new("B", 1),
            LineItem::new("A", 3),
        ]);
        assert_eq!(merged, vec![LineItem::new("A", 5), LineItem::new("B", 1)]);
    }
}
