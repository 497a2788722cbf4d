//! Event ingestion endpoint.
//!
//! Lets upstream services without a bus connection hand events to the saga.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use event_bus::{EventEnvelope, EventPublisher, IntegrationEvent};
use inventory::StockStore;
use orders::OrderRepository;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEventRequest {
    pub topic: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub partition_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEventResponse {
    pub event_id: String,
    pub topic: String,
    pub partition_key: String,
}

/// POST /events — validates an envelope against its topic contract and
/// publishes it on the bus.
#[tracing::instrument(skip(state, req), fields(topic = %req.topic))]
pub async fn ingest<R, S>(
    State(state): State<Arc<AppState<R, S>>>,
    Json(req): Json<IngestEventRequest>,
) -> Result<(StatusCode, Json<IngestEventResponse>), ApiError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let mut envelope = EventEnvelope::builder()
        .topic(req.topic)
        .payload_raw(req.payload)
        .metadata("source", serde_json::json!("http"))
        .try_build()
        .ok_or_else(|| ApiError::BadRequest("topic and payload are required".to_string()))?;

    let event = IntegrationEvent::from_envelope(&envelope)?;
    envelope.partition_key = req
        .partition_key
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| event.partition_key().to_string());

    let response = IngestEventResponse {
        event_id: envelope.event_id.to_string(),
        topic: envelope.topic.clone(),
        partition_key: envelope.partition_key.clone(),
    };
    state.bus.publish(envelope).await?;
    metrics::counter!("api_events_ingested_total", "topic" => event.topic()).increment(1);
    tracing::info!(order_id = %event.order_id(), "Event accepted");

    Ok((StatusCode::ACCEPTED, Json(response)))
}
