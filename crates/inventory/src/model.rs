use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock level of a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub product_id: ProductId,
    /// Units on hand.
    pub quantity: u32,
    /// Units held by active reservations.
    pub reserved: u32,
    pub reorder_level: u32,
    pub max_stock: Option<u32>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Creates an empty, active stock record.
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            quantity: 0,
            reserved: 0,
            reorder_level: 0,
            max_stock: None,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> u32 {
        self.quantity.saturating_sub(self.reserved)
    }

    /// Returns true if availability has dropped to the reorder level.
    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.reorder_level
    }

    /// Returns true if on-hand stock exceeds the configured maximum.
    pub fn exceeds_max_stock(&self) -> bool {
        self.max_stock.is_some_and(|max| self.quantity > max)
    }
}

/// Operator-controlled settings of a stock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockSettings {
    #[serde(default)]
    pub reorder_level: u32,
    #[serde(default)]
    pub max_stock: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            reorder_level: 0,
            max_stock: None,
            is_active: true,
        }
    }
}

/// Lifecycle of a reservation. Completed and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "completed" => Ok(ReservationStatus::Completed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// Why reserved units are being let go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    OrderCompleted,
    OrderCancelled,
    ManualRelease,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::OrderCompleted => "order_completed",
            ReleaseReason::OrderCancelled => "order_cancelled",
            ReleaseReason::ManualRelease => "manual_release",
        }
    }

    /// Status the reservation ends in after a release for this reason.
    pub fn resulting_status(&self) -> ReservationStatus {
        match self {
            ReleaseReason::OrderCompleted => ReservationStatus::Completed,
            ReleaseReason::OrderCancelled | ReleaseReason::ManualRelease => {
                ReservationStatus::Cancelled
            }
        }
    }
}

impl std::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to hold units of one product for one order.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub expires_at: DateTime<Utc>,
}

/// A claim on units of a product by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates an active reservation from a request.
    pub fn new(request: &ReservationRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            product_id: request.product_id.clone(),
            quantity: request.quantity,
            order_id: request.order_id.clone(),
            customer_id: request.customer_id.clone(),
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: request.expires_at,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }
}

/// Audit entry written by every ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockHistory {
    pub id: Uuid,
    pub product_id: ProductId,
    pub previous_quantity: u32,
    pub current_quantity: u32,
    pub previous_reserved: u32,
    pub current_reserved: u32,
    /// On-hand delta if on-hand moved, otherwise the reserved delta.
    pub change: i64,
    pub reason: String,
    pub order_id: Option<OrderId>,
    pub recorded_at: DateTime<Utc>,
}

impl StockHistory {
    /// Builds the entry describing the move from `before` to `after`.
    pub fn between(
        before: &StockRecord,
        after: &StockRecord,
        reason: impl Into<String>,
        order_id: Option<&OrderId>,
    ) -> Self {
        let quantity_delta = i64::from(after.quantity) - i64::from(before.quantity);
        let reserved_delta = i64::from(after.reserved) - i64::from(before.reserved);
        Self {
            id: Uuid::new_v4(),
            product_id: after.product_id.clone(),
            previous_quantity: before.quantity,
            current_quantity: after.quantity,
            previous_reserved: before.reserved,
            current_reserved: after.reserved,
            change: if quantity_delta != 0 {
                quantity_delta
            } else {
                reserved_delta
            },
            reason: reason.into(),
            order_id: order_id.cloned(),
            recorded_at: after.updated_at,
        }
    }
}
