use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};

use crate::Result;
use crate::model::{
    ReleaseReason, Reservation, ReservationRequest, StockHistory, StockRecord, StockSettings,
};

/// Persistence port for the stock ledger.
///
/// Every mutating method is atomic per product: the availability check and
/// the update happen under the product's lock, and the history entry is
/// written in the same unit of work.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Returns the product's stock record, creating an empty one if needed.
    async fn ensure_stock(&self, product_id: &ProductId) -> Result<StockRecord>;

    /// Returns the product's stock record without creating it.
    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<StockRecord>>;

    /// Replaces the product's operator settings.
    async fn update_settings(
        &self,
        product_id: &ProductId,
        settings: StockSettings,
    ) -> Result<StockRecord>;

    /// Reserves units for an order.
    ///
    /// If the order already holds an active reservation on the product, that
    /// reservation is returned unchanged.
    async fn reserve(&self, request: &ReservationRequest) -> Result<Reservation>;

    /// Releases the order's active reservation on the product.
    ///
    /// Returns `None` when there is no active reservation.
    async fn release(
        &self,
        product_id: &ProductId,
        order_id: &OrderId,
        reason: ReleaseReason,
    ) -> Result<Option<Reservation>>;

    /// Completes every active reservation of the order, deducting on-hand stock.
    async fn complete_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>>;

    /// Applies a signed correction to on-hand stock.
    async fn adjust(&self, product_id: &ProductId, delta: i64, reason: &str)
    -> Result<StockRecord>;

    /// Returns every reservation ever made for the order.
    async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>>;

    /// Returns active reservations whose expiry is at or before `now`.
    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

    /// Returns the product's audit trail, oldest first.
    async fn history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>>;
}
