//! Event plumbing shared by the fulfillment services.
//!
//! Services never call each other directly; they exchange the typed
//! [`IntegrationEvent`]s defined in [`contracts`], wrapped in an
//! [`EventEnvelope`] and handed to an [`EventPublisher`]. Delivery is
//! at-least-once, so every consumer must be idempotent.

pub mod contracts;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod publisher;

pub use contracts::{
    IntegrationEvent, InventoryReleased, InventoryReserveFailed, InventoryReserved, LineItem,
    OrderCancelled, OrderCompleted, OrderConfirmed, OrderCreated, PaymentFailed, PaymentInitiate,
    PaymentSucceeded, UnavailableItem, topics,
};
pub use envelope::{EventEnvelope, EventEnvelopeBuilder, EventId};
pub use error::{EventBusError, Result};
pub use memory::{InMemoryEventBus, Subscription};
pub use publisher::{EventPublisher, EventPublisherExt};
