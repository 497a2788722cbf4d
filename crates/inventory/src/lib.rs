//! Stock ledger and reservation engine.
//!
//! The ledger tracks on-hand and reserved units per product. Orders claim
//! units through reservations, which end either completed (stock really
//! leaves) or cancelled (units return to availability). Every mutation is
//! atomic per product and leaves an audit entry behind.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;
pub mod sweeper;

pub use engine::{BulkReserveOutcome, ReservationConfig, ReservationEngine};
pub use error::{InventoryError, Result};
pub use memory::InMemoryStockStore;
pub use model::{
    ReleaseReason, Reservation, ReservationRequest, ReservationStatus, StockHistory, StockRecord,
    StockSettings,
};
pub use postgres::PostgresStockStore;
pub use store::StockStore;
pub use sweeper::ExpirySweeper;
