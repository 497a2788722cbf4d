use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ReservationId};
use event_bus::LineItem;
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};
use crate::outbox::PendingEvent;
use crate::status::{OrderStatus, PaymentStatus};

/// An order as tracked by the fulfillment saga.
///
/// This is plain data; status changes go through [`Order::transition_to`] so
/// the transition table is always enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<LineItem>,
    pub total_amount: Option<Money>,
    /// Distinct products that must be reserved before confirmation.
    pub expected_item_count: u32,
    /// Distinct reservations acknowledged so far.
    pub reserved_item_count: u32,
    /// Reservation ids already counted, for deduplication.
    pub counted_reservations: Vec<ReservationId>,
    pub cancellation_reason: Option<String>,
    /// Events staged by the last state change and not yet published.
    #[serde(default)]
    pub outbox: Vec<PendingEvent>,
    /// Optimistic concurrency version, bumped on every save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order expecting one reservation per distinct product.
    pub fn new(
        id: OrderId,
        order_number: impl Into<String>,
        customer_id: Option<CustomerId>,
        items: Vec<LineItem>,
        total_amount: Option<Money>,
    ) -> Self {
        let distinct: HashSet<_> = items.iter().map(|item| &item.product_id).collect();
        let expected_item_count = u32::try_from(distinct.len()).unwrap_or(u32::MAX);
        let now = Utc::now();

        Self {
            id,
            order_number: order_number.into(),
            customer_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items,
            total_amount,
            expected_item_count,
            reserved_item_count: 0,
            counted_reservations: Vec::new(),
            cancellation_reason: None,
            outbox: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order to `to`, or fails leaving it unchanged.
    pub fn transition_to(&mut self, to: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancels the order with a reason and a failed payment.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_to(OrderStatus::Cancelled)?;
        self.payment_status = PaymentStatus::Failed;
        self.cancellation_reason = Some(reason.into());
        Ok(())
    }

    /// Counts a reservation towards confirmation.
    ///
    /// Returns false if the reservation was already counted.
    pub fn count_reservation(&mut self, reservation_id: ReservationId) -> bool {
        if self.counted_reservations.contains(&reservation_id) {
            return false;
        }
        self.counted_reservations.push(reservation_id);
        self.reserved_item_count += 1;
        self.updated_at = Utc::now();
        true
    }

    /// Returns true once every expected reservation has been counted.
    pub fn all_items_reserved(&self) -> bool {
        self.reserved_item_count >= self.expected_item_count
    }

    /// Returns true while staged events still await publishing.
    pub fn has_pending_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Returns the total, or zero when it is unknown.
    pub fn total_or_zero(&self) -> Money {
        self.total_amount.unwrap_or_default()
    }
}
