use common::OrderId;
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors that can occur when changing or persisting orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The status change is not in the transition table.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The order was modified by someone else since it was loaded.
    #[error("Concurrent modification of order {order_id}: expected version {expected}, found {actual}")]
    Conflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// A storage failure that is expected to succeed on retry.
    #[error("Transient persistence error: {0}")]
    TransientPersistence(String),

    /// A storage failure that will not go away on retry.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A stored column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::TransientPersistence(_))
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_sqlx(&err) {
            OrderError::TransientPersistence(err.to_string())
        } else {
            OrderError::Persistence(err.to_string())
        }
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "55P03"))
        }
        _ => false,
    }
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
