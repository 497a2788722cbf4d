//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use inventory::StockStore;
use orders::OrderRepository;

use crate::AppState;

/// GET /metrics — renders reservation and saga metrics in Prometheus text format.
pub async fn get<R, S>(State(state): State<Arc<AppState<R, S>>>) -> impl IntoResponse
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
