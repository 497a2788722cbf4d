//! Stock inspection and operator endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ProductId;
use inventory::{StockHistory, StockRecord, StockSettings, StockStore};
use orders::OrderRepository;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    #[serde(flatten)]
    pub stock: StockRecord,
    pub available: u32,
    pub low_stock: bool,
}

impl From<StockRecord> for StockResponse {
    fn from(stock: StockRecord) -> Self {
        Self {
            available: stock.available(),
            low_stock: stock.is_low_stock(),
            stock,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub delta: i64,
    #[serde(default = "default_adjustment_reason")]
    pub reason: String,
}

fn default_adjustment_reason() -> String {
    "manual_adjustment".to_string()
}

/// GET /stock/{productId}
#[tracing::instrument(skip(state))]
pub async fn get<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<StockResponse>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let stock = state
        .engine()
        .stock(&ProductId::new(&product_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {product_id} not found")))?;
    Ok(Json(stock.into()))
}

/// PUT /stock/{productId}/settings — replaces reorder level, maximum and active flag.
#[tracing::instrument(skip(state, settings))]
pub async fn update_settings<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(product_id): Path<String>,
    Json(settings): Json<StockSettings>,
) -> Result<Json<StockResponse>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    if let Some(max_stock) = settings.max_stock
        && max_stock < settings.reorder_level
    {
        return Err(ApiError::BadRequest(
            "maxStock must not be below reorderLevel".to_string(),
        ));
    }

    let stock = state
        .engine()
        .configure(&ProductId::new(product_id), settings)
        .await?;
    Ok(Json(stock.into()))
}

/// POST /stock/{productId}/adjustments — applies a signed correction to on-hand stock.
#[tracing::instrument(skip(state, req), fields(delta = req.delta))]
pub async fn adjust<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(product_id): Path<String>,
    Json(req): Json<AdjustmentRequest>,
) -> Result<Json<StockResponse>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    if req.delta == 0 {
        return Err(ApiError::BadRequest("delta must not be zero".to_string()));
    }

    let stock = state
        .engine()
        .adjust(&ProductId::new(product_id), req.delta, &req.reason)
        .await?;
    Ok(Json(stock.into()))
}

/// GET /stock/{productId}/history — the product's audit trail, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<StockHistory>>, ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let history = state.engine().history(&ProductId::new(product_id)).await?;
    Ok(Json(history))
}
