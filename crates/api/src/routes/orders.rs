//! Read-only order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use inventory::{Reservation, StockStore};
use orders::{Order, OrderRepository};

use crate::AppState;
use crate::error::ApiError;

/// GET /orders/{orderId} — the saga's view of an order.
#[tracing::instrument(skip(state))]
pub async fn get<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(order_id): Path<String>,
) -> Result<Json<Order>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let order = state
        .orders()
        .get(&OrderId::new(&order_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(order))
}

/// GET /orders/{orderId}/reservations — every reservation made for the order.
#[tracing::instrument(skip(state))]
pub async fn reservations<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<Reservation>>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let reservations = state
        .engine()
        .reservations_for_order(&OrderId::new(order_id))
        .await?;
    Ok(Json(reservations))
}
