//! Identifiers and value types shared by every fulfillment crate.

mod money;
mod types;

pub use money::Money;
pub use types::{CustomerId, OrderId, ProductId, ReservationId};
