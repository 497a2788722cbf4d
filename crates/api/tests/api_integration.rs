//! Integration tests for the fulfillment HTTP service.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use inventory::InMemoryStockStore;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::InMemoryOrderRepository;
use saga::EventDispatcher;
use tokio::sync::watch;
use tower::ServiceExt;

type TestState = Arc<AppState<InMemoryOrderRepository, InMemoryStockStore>>;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, TestState) {
    let state = api::create_default_state(get_metrics_handle(), &Config::default());
    (api::create_app(state.clone()), state)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn stock_product(app: &axum::Router, product_id: &str, quantity: i64) {
    let (status, _) = send(
        app,
        json_request(
            "POST",
            &format!("/stock/{product_id}/adjustments"),
            serde_json::json!({ "delta": quantity, "reason": "restock" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_adjust_and_get_stock() {
    let (app, _) = setup();
    stock_product(&app, "1", 10).await;

    let (status, json) = send(&app, get("/stock/1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["productId"], "1");
    assert_eq!(json["quantity"], 10);
    assert_eq!(json["reserved"], 0);
    assert_eq!(json["available"], 10);
}

#[tokio::test]
async fn test_unknown_stock_is_not_found() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/stock/missing")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_negative_adjustment_is_rejected() {
    let (app, _) = setup();
    stock_product(&app, "1", 10).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/stock/1/adjustments",
            serde_json::json!({ "delta": -20 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = send(&app, get("/stock/1")).await;
    assert_eq!(json["quantity"], 10);
}

#[tokio::test]
async fn test_zero_adjustment_is_bad_request() {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/stock/1/adjustments",
            serde_json::json!({ "delta": 0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_settings() {
    let (app, _) = setup();
    stock_product(&app, "1", 10).await;

    let (status, json) = send(
        &app,
        json_request(
            "PUT",
            "/stock/1/settings",
            serde_json::json!({ "reorderLevel": 5, "maxStock": 100, "isActive": false }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reorderLevel"], 5);
    assert_eq!(json["maxStock"], 100);
    assert_eq!(json["isActive"], false);
}

#[tokio::test]
async fn test_settings_reject_max_below_reorder_level() {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            "/stock/1/settings",
            serde_json::json!({ "reorderLevel": 50, "maxStock": 10 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stock_history_records_adjustments() {
    let (app, _) = setup();
    stock_product(&app, "1", 10).await;
    stock_product(&app, "1", -3).await;

    let (status, json) = send(&app, get("/stock/1/history")).await;

    assert_eq!(status, StatusCode::OK);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["previousQuantity"], 10);
    assert_eq!(entries[1]["currentQuantity"], 7);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let (app, _) = setup();

    let (status, _) = send(&app, get("/orders/404")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reservations_of_unknown_order_are_empty() {
    let (app, _) = setup();

    let (status, json) = send(&app, get("/orders/404/reservations")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_ingest_publishes_on_bus() {
    let (app, state) = setup();

    let (status, json) = send(
        &app,
        json_request(
            "POST",
            "/events",
            serde_json::json!({
                "topic": "order.completed",
                "payload": { "orderId": "100" }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["topic"], "order.completed");
    assert_eq!(json["partitionKey"], "100");

    let published = state.bus.published_on("order.completed").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].partition_key, "100");
}

#[tokio::test]
async fn test_ingest_rejects_unknown_topic() {
    let (app, state) = setup();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/events",
            serde_json::json!({ "topic": "order.teleported", "payload": {} }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.bus.event_count().await, 0);
}

#[tokio::test]
async fn test_ingest_rejects_malformed_payload() {
    let (app, _) = setup();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/events",
            serde_json::json!({
                "topic": "payment.success",
                "payload": { "orderId": "100" }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingested_order_is_reserved_and_confirmed() {
    let (app, state) = setup();
    stock_product(&app, "A", 10).await;
    stock_product(&app, "B", 5).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = EventDispatcher::new(
        state.coordinator.clone(),
        Config::default().dispatcher(),
    )
    .spawn(state.bus.subscribe().await, shutdown_rx);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/events",
            serde_json::json!({
                "topic": "order.created",
                "payload": {
                    "orderId": "100",
                    "orderNumber": "ORD-100",
                    "customerId": "cust-1",
                    "items": [
                        { "productId": "A", "quantity": 2 },
                        { "productId": "B", "quantity": 1 }
                    ],
                    "totalAmount": 1500
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut order = serde_json::Value::Null;
    for _ in 0..200 {
        let (status, json) = send(&app, get("/orders/100")).await;
        if status == StatusCode::OK && json["status"] == "confirmed" {
            order = json;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(order["status"], "confirmed", "order was not confirmed in time");
    assert_eq!(order["reservedItemCount"], 2);

    let (_, reservations) = send(&app, get("/orders/100/reservations")).await;
    assert_eq!(reservations.as_array().unwrap().len(), 2);

    let (_, stock) = send(&app, get("/stock/A")).await;
    assert_eq!(stock["reserved"], 2);
    assert_eq!(stock["available"], 8);

    shutdown_tx.send(true).unwrap();
    dispatcher.await.unwrap();
}
