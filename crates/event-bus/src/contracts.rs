//! Typed payloads for every topic the fulfillment services exchange.
//!
//! Payloads are camelCase JSON; amounts are integer minor units.

use common::{CustomerId, Money, OrderId, ProductId, ReservationId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::envelope::{EventEnvelope, EventId};
use crate::error::{EventBusError, Result};

/// Topic names.
pub mod topics {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_COMPLETED: &str = "order.completed";
    pub const ORDER_CANCELLED: &str = "order.cancelled";
    pub const ORDER_CONFIRMED: &str = "order.confirmed";
    pub const PAYMENT_SUCCESS: &str = "payment.success";
    pub const PAYMENT_FAILED: &str = "payment.failed";
    pub const PAYMENT_INITIATE: &str = "payment.initiate";
    pub const INVENTORY_RESERVED: &str = "inventory.reserved";
    pub const INVENTORY_RESERVE_FAILED: &str = "inventory.reserve_failed";
    pub const INVENTORY_RELEASED: &str = "inventory.released";
}

/// One requested line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A line that could not be reserved, with the availability seen at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableItem {
    pub product_id: ProductId,
    pub requested_quantity: u32,
    pub available_quantity: u32,
}

/// `order.created` — a customer placed an order.
///
/// The ordering service may omit the customer or total; the saga enriches
/// them through the order query port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Money>,
}

/// `order.completed` — the order was delivered and stock can be finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleted {
    pub order_id: OrderId,
}

/// `order.cancelled` — consumed from other services and produced by the saga
/// after a payment failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    pub reason: String,
}

/// `payment.success`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceeded {
    pub order_id: OrderId,
    pub transaction_id: String,
    pub amount: Money,
}

/// `payment.failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub order_id: OrderId,
    pub reason: String,
    #[serde(default)]
    pub can_retry: bool,
}

/// `inventory.reserved` — one per reservation made for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserved {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
}

/// `inventory.reserve_failed` — the order could not be fully stocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveFailed {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub reason: String,
    pub unavailable_items: Vec<UnavailableItem>,
}

/// `inventory.released` — reserved units went back to availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReleased {
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_id: OrderId,
    pub reason: String,
}

/// `order.confirmed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub total_amount: Money,
}

/// `payment.initiate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiate {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub amount: Money,
}

/// Every event that crosses a service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationEvent {
    OrderCreated(OrderCreated),
    OrderCompleted(OrderCompleted),
    OrderCancelled(OrderCancelled),
    OrderConfirmed(OrderConfirmed),
    PaymentSucceeded(PaymentSucceeded),
    PaymentFailed(PaymentFailed),
    PaymentInitiate(PaymentInitiate),
    InventoryReserved(InventoryReserved),
    InventoryReserveFailed(InventoryReserveFailed),
    InventoryReleased(InventoryReleased),
}

impl IntegrationEvent {
    /// Returns the topic this event is published on.
    pub fn topic(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderCreated(_) => topics::ORDER_CREATED,
            IntegrationEvent::OrderCompleted(_) => topics::ORDER_COMPLETED,
            IntegrationEvent::OrderCancelled(_) => topics::ORDER_CANCELLED,
            IntegrationEvent::OrderConfirmed(_) => topics::ORDER_CONFIRMED,
            IntegrationEvent::PaymentSucceeded(_) => topics::PAYMENT_SUCCESS,
            IntegrationEvent::PaymentFailed(_) => topics::PAYMENT_FAILED,
            IntegrationEvent::PaymentInitiate(_) => topics::PAYMENT_INITIATE,
            IntegrationEvent::InventoryReserved(_) => topics::INVENTORY_RESERVED,
            IntegrationEvent::InventoryReserveFailed(_) => topics::INVENTORY_RESERVE_FAILED,
            IntegrationEvent::InventoryReleased(_) => topics::INVENTORY_RELEASED,
        }
    }

    /// Returns the order this event concerns. Every contract carries one.
    pub fn order_id(&self) -> &OrderId {
        match self {
            IntegrationEvent::OrderCreated(e) => &e.order_id,
            IntegrationEvent::OrderCompleted(e) => &e.order_id,
            IntegrationEvent::OrderCancelled(e) => &e.order_id,
            IntegrationEvent::OrderConfirmed(e) => &e.order_id,
            IntegrationEvent::PaymentSucceeded(e) => &e.order_id,
            IntegrationEvent::PaymentFailed(e) => &e.order_id,
            IntegrationEvent::PaymentInitiate(e) => &e.order_id,
            IntegrationEvent::InventoryReserved(e) => &e.order_id,
            IntegrationEvent::InventoryReserveFailed(e) => &e.order_id,
            IntegrationEvent::InventoryReleased(e) => &e.order_id,
        }
    }

    /// Returns the transport partition key: the product for stock movements,
    /// the order for everything else.
    pub fn partition_key(&self) -> &str {
        match self {
            IntegrationEvent::InventoryReserved(e) => e.product_id.as_str(),
            IntegrationEvent::InventoryReleased(e) => e.product_id.as_str(),
            other => other.order_id().as_str(),
        }
    }

    /// Wraps the event in a fresh envelope.
    pub fn to_envelope(&self) -> Result<EventEnvelope> {
        let payload = self.payload().map_err(|source| EventBusError::Serialization {
            topic: self.topic().to_string(),
            source,
        })?;

        Ok(EventEnvelope {
            event_id: EventId::new(),
            topic: self.topic().to_string(),
            partition_key: self.partition_key().to_string(),
            timestamp: chrono::Utc::now(),
            payload,
            metadata: Default::default(),
        })
    }

    /// Decodes an envelope according to its topic.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Self> {
        let event = match envelope.topic.as_str() {
            topics::ORDER_CREATED => IntegrationEvent::OrderCreated(decode(envelope)?),
            topics::ORDER_COMPLETED => IntegrationEvent::OrderCompleted(decode(envelope)?),
            topics::ORDER_CANCELLED => IntegrationEvent::OrderCancelled(decode(envelope)?),
            topics::ORDER_CONFIRMED => IntegrationEvent::OrderConfirmed(decode(envelope)?),
            topics::PAYMENT_SUCCESS => IntegrationEvent::PaymentSucceeded(decode(envelope)?),
            topics::PAYMENT_FAILED => IntegrationEvent::PaymentFailed(decode(envelope)?),
            topics::PAYMENT_INITIATE => IntegrationEvent::PaymentInitiate(decode(envelope)?),
            topics::INVENTORY_RESERVED => IntegrationEvent::InventoryReserved(decode(envelope)?),
            topics::INVENTORY_RESERVE_FAILED => {
                IntegrationEvent::InventoryReserveFailed(decode(envelope)?)
            }
            topics::INVENTORY_RELEASED => IntegrationEvent::InventoryReleased(decode(envelope)?),
            other => return Err(EventBusError::UnknownTopic(other.to_string())),
        };
        Ok(event)
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            IntegrationEvent::OrderCreated(e) => serde_json::to_value(e),
            IntegrationEvent::OrderCompleted(e) => serde_json::to_value(e),
            IntegrationEvent::OrderCancelled(e) => serde_json::to_value(e),
            IntegrationEvent::OrderConfirmed(e) => serde_json::to_value(e),
            IntegrationEvent::PaymentSucceeded(e) => serde_json::to_value(e),
            IntegrationEvent::PaymentFailed(e) => serde_json::to_value(e),
            IntegrationEvent::PaymentInitiate(e) => serde_json::to_value(e),
            IntegrationEvent::InventoryReserved(e) => serde_json::to_value(e),
            IntegrationEvent::InventoryReserveFailed(e) => serde_json::to_value(e),
            IntegrationEvent::InventoryReleased(e) => serde_json::to_value(e),
        }
    }
}

fn decode<T: DeserializeOwned>(envelope: &EventEnvelope) -> Result<T> {
    serde_json::from_value(envelope.payload.clone()).map_err(|source| {
        EventBusError::Serialization {
            topic: envelope.topic.clone(),
            source,
        }
    })
}
