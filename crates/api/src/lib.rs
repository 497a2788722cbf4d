//! HTTP service hosting the order fulfillment saga.
//!
//! Exposes stock and order inspection, operator stock corrections and event
//! ingestion, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_bus::InMemoryEventBus;
use inventory::{InMemoryStockStore, ReservationEngine, StockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderRepository, OrderRepository};
use saga::{InMemoryOrderQuery, SagaCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// The saga coordinator as wired in this service.
pub type Coordinator<R, S> = SagaCoordinator<R, S, InMemoryEventBus, InMemoryOrderQuery>;

/// Shared application state accessible from all handlers.
pub struct AppState<R, S>
where
    R: OrderRepository,
    S: StockStore,
{
    pub coordinator: Arc<Coordinator<R, S>>,
    pub bus: InMemoryEventBus,
    pub metrics: PrometheusHandle,
}

impl<R, S> AppState<R, S>
where
    R: OrderRepository,
    S: StockStore,
{
    /// Wires the reservation engine and saga coordinator over the given adapters.
    pub fn new(
        orders: R,
        store: S,
        bus: InMemoryEventBus,
        metrics: PrometheusHandle,
        config: &Config,
    ) -> Self {
        let engine = Arc::new(ReservationEngine::with_config(
            store,
            bus.clone(),
            config.reservations(),
        ));
        let coordinator =
            SagaCoordinator::new(orders, engine, bus.clone(), InMemoryOrderQuery::new())
                .with_retry_config(config.retry());

        Self {
            coordinator: Arc::new(coordinator),
            bus,
            metrics,
        }
    }

    pub fn orders(&self) -> &R {
        self.coordinator.orders()
    }

    pub fn engine(&self) -> &Arc<ReservationEngine<S, InMemoryEventBus>> {
        self.coordinator.engine()
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, S>(state: Arc<AppState<R, S>>) -> Router
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::get::<R, S>))
        .route("/events", post(routes::events::ingest::<R, S>))
        .route("/stock/{product_id}", get(routes::stock::get::<R, S>))
        .route(
            "/stock/{product_id}/settings",
            put(routes::stock::update_settings::<R, S>),
        )
        .route(
            "/stock/{product_id}/adjustments",
            post(routes::stock::adjust::<R, S>),
        )
        .route(
            "/stock/{product_id}/history",
            get(routes::stock::history::<R, S>),
        )
        .route("/orders/{order_id}", get(routes::orders::get::<R, S>))
        .route(
            "/orders/{order_id}/reservations",
            get(routes::orders::reservations::<R, S>),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed entirely by in-memory adapters.
///
/// The bus records every published event, which suits tests and local runs.
pub fn create_default_state(
    metrics: PrometheusHandle,
    config: &Config,
) -> Arc<AppState<InMemoryOrderRepository, InMemoryStockStore>> {
    Arc::new(AppState::new(
        InMemoryOrderRepository::new(),
        InMemoryStockStore::new(),
        InMemoryEventBus::with_log(),
        metrics,
        config,
    ))
}
