//! Fulfillment service entry point.

use std::error::Error;
use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use event_bus::InMemoryEventBus;
use inventory::{ExpirySweeper, InMemoryStockStore, PostgresStockStore, StockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderRepository, OrderRepository, PostgresOrderRepository};
use saga::EventDispatcher;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the consumers, the expiry sweeper and the HTTP server until shutdown.
async fn serve<R, S>(config: &Config, state: Arc<AppState<R, S>>) -> Result<(), BoxError>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = EventDispatcher::new(state.coordinator.clone(), config.dispatcher())
        .spawn(state.bus.subscribe().await, shutdown_rx.clone());
    let sweeper = ExpirySweeper::new(state.engine().clone(), config.expiry_sweep_interval())
        .spawn(shutdown_rx);

    let app = api::create_app(state);
    let addr = config.addr();
    tracing::info!(%addr, "starting fulfillment service");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Consumers drain their queues before exiting.
    let _ = shutdown_tx.send(true);
    dispatcher.await?;
    sweeper.await?;
    Ok(())
}

async fn run(config: Config, metrics: PrometheusHandle) -> Result<(), BoxError> {
    let bus = InMemoryEventBus::new();

    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let stock = PostgresStockStore::new(pool.clone());
            stock.run_migrations().await?;
            tracing::info!("using PostgreSQL storage");

            let state = AppState::new(
                PostgresOrderRepository::new(pool),
                stock,
                bus,
                metrics,
                &config,
            );
            serve(&config, Arc::new(state)).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            let state = AppState::new(
                InMemoryOrderRepository::new(),
                InMemoryStockStore::new(),
                bus,
                metrics,
                &config,
            );
            serve(&config, Arc::new(state)).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install Prometheus recorder: {e}"))?;

    // 3. Wire storage, consumers and HTTP, then serve until shutdown
    run(config, metrics).await?;

    tracing::info!("service shut down gracefully");
    Ok(())
}
