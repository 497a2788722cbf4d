//! Saga decisions as pure functions.
//!
//! Each function looks at the current order and an inbound event and either
//! ignores the event (late, duplicate or out of order) or returns the updated
//! order. The coordinator performs the resulting effects.

use common::ReservationId;
use orders::{Order, OrderStatus, PaymentStatus};

/// What to do with an inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Leave the order alone.
    Ignore(&'static str),
    /// Persist this new version of the order.
    Update(Order),
}

/// Counts a reservation and confirms the order once all are in.
pub fn on_inventory_reserved(order: &Order, reservation_id: ReservationId) -> Verdict {
    if order.status != OrderStatus::Pending {
        return Verdict::Ignore("order is no longer pending");
    }

    let mut updated = order.clone();
    if !updated.count_reservation(reservation_id) {
        return Verdict::Ignore("reservation already counted");
    }
    if updated.all_items_reserved() {
        if updated.transition_to(OrderStatus::Confirmed).is_err() {
            return Verdict::Ignore("order cannot be confirmed");
        }
        updated.payment_status = PaymentStatus::Pending;
    }
    Verdict::Update(updated)
}

/// Cancels the order because stock could not be reserved.
pub fn on_reserve_failed(order: &Order, reason: &str) -> Verdict {
    cancel(order, reason)
}

/// Marks the order paid.
pub fn on_payment_succeeded(order: &Order) -> Verdict {
    match order.status {
        OrderStatus::Paid => return Verdict::Ignore("order already paid"),
        OrderStatus::Cancelled => return Verdict::Ignore("order is cancelled"),
        _ => {}
    }

    let mut updated = order.clone();
    if updated.transition_to(OrderStatus::Paid).is_err() {
        return Verdict::Ignore("payment not expected in current status");
    }
    updated.payment_status = PaymentStatus::Paid;
    Verdict::Update(updated)
}

/// Cancels the order because payment failed.
pub fn on_payment_failed(order: &Order, reason: &str) -> Verdict {
    cancel(order, reason)
}

/// Cancels the order because another service cancelled it.
pub fn on_order_cancelled(order: &Order, reason: &str) -> Verdict {
    cancel(order, reason)
}

fn cancel(order: &Order, reason: &str) -> Verdict {
    if order.status == OrderStatus::Cancelled {
        return Verdict::Ignore("order already cancelled");
    }

    let mut updated = order.clone();
    if updated.cancel(reason).is_err() {
        return Verdict::Ignore("order can no longer be cancelled");
    }
    Verdict::Update(updated)
}
