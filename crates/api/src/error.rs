//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_bus::EventBusError;
use inventory::InventoryError;
use orders::OrderError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Stock ledger error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// Order persistence error.
    #[error(transparent)]
    Order(#[from] OrderError),
    /// Event ingestion error.
    #[error(transparent)]
    EventBus(#[from] EventBusError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Inventory(err) => inventory_status(err),
            ApiError::Order(err) => order_status(err),
            ApiError::EventBus(err) => match err {
                EventBusError::UnknownTopic(_) | EventBusError::Serialization { .. } => {
                    StatusCode::BAD_REQUEST
                }
                EventBusError::Publish(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::ReservationNotFound { .. } => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. }
        | InventoryError::NegativeStock { .. }
        | InventoryError::ProductInactive(_) => StatusCode::CONFLICT,
        InventoryError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        InventoryError::TransientPersistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        InventoryError::Persistence(_) | InventoryError::Publish(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::InvalidStatusTransition { .. } | OrderError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        OrderError::TransientPersistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrderError::Persistence(_) | OrderError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
