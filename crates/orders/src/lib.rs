//! Orders as seen by the fulfillment saga.
//!
//! An [`Order`] is a plain record; its status only moves along the
//! [`OrderStatus`] transition table, and saves are guarded by an optimistic
//! version check. Events an order change must emit are staged in the
//! order's outbox and saved with it.

pub mod error;
pub mod order;
pub mod outbox;
pub mod postgres;
pub mod repository;
pub mod status;

pub use error::{OrderError, Result};
pub use order::Order;
pub use outbox::PendingEvent;
pub use postgres::PostgresOrderRepository;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use status::{OrderStatus, PaymentStatus};
