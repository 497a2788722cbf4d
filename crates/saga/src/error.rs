//! Saga error types.

use common::OrderId;
use event_bus::EventBusError;
use inventory::InventoryError;
use orders::OrderError;
use thiserror::Error;

/// Errors that can occur while handling saga events.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Stock ledger error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Order state or persistence error.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Event encoding or publishing error.
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// The order query collaborator could not be reached.
    #[error("Order query unavailable: {0}")]
    QueryUnavailable(String),

    /// The event refers to an order this service has never seen.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The event lacks data the saga cannot do without.
    #[error("Incomplete payload for order {order_id}: {reason}")]
    IncompletePayload { order_id: OrderId, reason: String },

    /// A transient failure persisted through every retry.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<SagaError>,
    },
}

impl SagaError {
    /// Returns true if handling the event again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Inventory(e) => e.is_transient(),
            SagaError::Order(OrderError::Conflict { .. }) => true,
            SagaError::Order(e) => e.is_transient(),
            SagaError::EventBus(e) => e.is_transient(),
            SagaError::QueryUnavailable(_) => true,
            SagaError::OrderNotFound(_)
            | SagaError::IncompletePayload { .. }
            | SagaError::RetriesExhausted { .. } => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_and_storage_hiccups_are_transient() {
        assert!(
            SagaError::from(OrderError::Conflict {
                order_id: OrderId::new("100"),
                expected: 0,
                actual: 1,
            })
            .is_transient()
        );
        assert!(SagaError::from(InventoryError::TransientPersistence("io".into())).is_transient());
        assert!(SagaError::from(EventBusError::Publish("down".into())).is_transient());
    }

    #[test]
    fn test_exhausted_retries_are_final() {
        let err = SagaError::RetriesExhausted {
            operation: "save_order".into(),
            attempts: 3,
            source: Box::new(SagaError::QueryUnavailable("timeout".into())),
        };
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "save_order failed after 3 attempts: Order query unavailable: timeout"
        );
    }
}
