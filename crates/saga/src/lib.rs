//! Order fulfillment saga.
//!
//! The coordinator consumes order, payment and inventory events and drives
//! each order through its lifecycle:
//!
//! 1. `order.created` reserves stock for every line, all or nothing
//! 2. each `inventory.reserved` is counted; the last one confirms the order
//!    and asks for payment
//! 3. `payment.success` marks the order paid, `payment.failed` cancels it
//! 4. `order.completed` finalizes stock, `order.cancelled` releases it
//!
//! Compensation happens inside the reservation engine: a partially reserved
//! order releases what it holds before the failure is published.

pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod policy;
pub mod query;
pub mod retry;

pub use coordinator::{Outcome, SagaCoordinator};
pub use dispatcher::{DispatcherConfig, EventDispatcher};
pub use error::{Result, SagaError};
pub use policy::Verdict;
pub use query::{InMemoryOrderQuery, OrderQuery, OrderSummary};
pub use retry::{RetryConfig, with_retry, with_retry_when};
