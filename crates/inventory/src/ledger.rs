//! Pure stock ledger rules.
//!
//! Each rule validates before it mutates, so a returned error always leaves
//! the record (and reservation) exactly as it was. Stores apply these rules
//! while holding the product's lock and persist the result together with a
//! [`StockHistory`](crate::StockHistory) entry.

use chrono::{DateTime, Utc};

use crate::error::{InventoryError, Result};
use crate::model::{ReleaseReason, Reservation, ReservationStatus, StockRecord};

/// Holds `quantity` units for a new reservation.
pub fn reserve(stock: &mut StockRecord, quantity: u32, now: DateTime<Utc>) -> Result<()> {
    if quantity == 0 {
        return Err(InventoryError::InvalidQuantity {
            product_id: stock.product_id.clone(),
            quantity: 0,
        });
    }
    if !stock.is_active {
        return Err(InventoryError::ProductInactive(stock.product_id.clone()));
    }
    let available = stock.available();
    if available < quantity {
        return Err(InventoryError::InsufficientStock {
            product_id: stock.product_id.clone(),
            requested: quantity,
            available,
        });
    }

    stock.reserved += quantity;
    stock.updated_at = now;
    Ok(())
}

/// Lets go of an active reservation's units and closes it.
///
/// Returns false without touching anything if the reservation is already
/// terminal.
pub fn release(
    stock: &mut StockRecord,
    reservation: &mut Reservation,
    reason: ReleaseReason,
    now: DateTime<Utc>,
) -> bool {
    if !reservation.is_active() {
        return false;
    }

    stock.reserved = stock.reserved.saturating_sub(reservation.quantity);
    stock.updated_at = now;
    reservation.status = reason.resulting_status();
    reservation.updated_at = now;
    true
}

/// Turns an active reservation into a real deduction of on-hand stock.
///
/// Returns false without touching anything if the reservation is already
/// terminal.
pub fn complete(stock: &mut StockRecord, reservation: &mut Reservation, now: DateTime<Utc>) -> bool {
    if !reservation.is_active() {
        return false;
    }

    stock.reserved = stock.reserved.saturating_sub(reservation.quantity);
    stock.quantity = stock.quantity.saturating_sub(reservation.quantity);
    stock.updated_at = now;
    reservation.status = ReservationStatus::Completed;
    reservation.updated_at = now;
    true
}

/// Applies a signed correction to on-hand stock.
pub fn adjust(stock: &mut StockRecord, delta: i64, now: DateTime<Utc>) -> Result<()> {
    let target = i64::from(stock.quantity) + delta;
    if target < i64::from(stock.reserved) {
        return Err(InventoryError::NegativeStock {
            product_id: stock.product_id.clone(),
            quantity: stock.quantity,
            reserved: stock.reserved,
            delta,
        });
    }
    let quantity = u32::try_from(target).map_err(|_| InventoryError::InvalidQuantity {
        product_id: stock.product_id.clone(),
        quantity: target,
    })?;

    stock.quantity = quantity;
    stock.updated_at = now;
    Ok(())
}
