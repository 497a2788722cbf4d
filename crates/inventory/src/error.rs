use common::{OrderId, ProductId};
use event_bus::EventBusError;
use thiserror::Error;

/// Errors that can occur in the stock ledger and reservation engine.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Fewer units are available than were requested.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// No active reservation exists for the product and order.
    #[error("No active reservation for product {product_id} and order {order_id}")]
    ReservationNotFound {
        product_id: ProductId,
        order_id: OrderId,
    },

    /// An adjustment would take on-hand stock below zero or below what is reserved.
    #[error(
        "Adjustment of {delta} on product {product_id} would leave negative stock (quantity {quantity}, reserved {reserved})"
    )]
    NegativeStock {
        product_id: ProductId,
        quantity: u32,
        reserved: u32,
        delta: i64,
    },

    /// The product has been deactivated.
    #[error("Product {0} is inactive")]
    ProductInactive(ProductId),

    /// The requested quantity is zero or out of range.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    /// A storage failure that is expected to succeed on retry.
    #[error("Transient persistence error: {0}")]
    TransientPersistence(String),

    /// A storage failure that will not go away on retry.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An event could not be published.
    #[error("Event publishing failed: {0}")]
    Publish(#[from] EventBusError),
}

impl InventoryError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, InventoryError::TransientPersistence(_))
    }

    /// Returns true for rule violations (as opposed to infrastructure failures).
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            InventoryError::InsufficientStock { .. }
                | InventoryError::ProductInactive(_)
                | InventoryError::InvalidQuantity { .. }
                | InventoryError::NegativeStock { .. }
        )
    }
}

impl From<sqlx::Error> for InventoryError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            InventoryError::TransientPersistence(err.to_string())
        } else {
            InventoryError::Persistence(err.to_string())
        }
    }
}

/// Pool exhaustion, I/O, serialization failures, deadlocks and lock timeouts
/// are worth retrying.
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "55P03"))
        }
        _ => false,
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
