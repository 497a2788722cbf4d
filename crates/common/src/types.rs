use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a string-backed identifier owned by another service.
///
/// Orders, products and customers are created outside this system, so their
/// identifiers are opaque strings rather than locally generated UUIDs.
macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

external_id!(
    /// Identifier of an order, assigned by the ordering service.
    OrderId
);

external_id!(
    /// Product identifier (SKU).
    ProductId
);

external_id!(
    /// Identifier of the customer who placed an order.
    CustomerId
);

/// Unique identifier for a stock reservation.
///
/// Reservations are created by the reservation engine, so unlike the other
/// identifiers this one is generated locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random reservation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a reservation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ReservationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ReservationId> for Uuid {
    fn from(id: ReservationId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_id_new_creates_unique_ids() {
        let id1 = ReservationId::new();
        let id2 = ReservationId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn reservation_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ReservationId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn external_ids_serialize_as_plain_strings() {
        let order_id = OrderId::new("100");
        assert_eq!(serde_json::to_string(&order_id).unwrap(), "\"100\"");

        let product_id: ProductId = serde_json::from_str("\"SKU-001\"").unwrap();
        assert_eq!(product_id.as_str(), "SKU-001");
    }

    #[test]
    fn external_id_conversions() {
        let from_str: CustomerId = "cust-1".into();
        let from_string: CustomerId = String::from("cust-1").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.to_string(), "cust-1");
    }
}
