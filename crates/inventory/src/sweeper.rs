use std::sync::Arc;
use std::time::Duration;

use event_bus::EventPublisher;
use tokio::sync::watch;

use crate::engine::ReservationEngine;
use crate::store::StockStore;

/// Background task that releases expired reservations on a fixed interval.
pub struct ExpirySweeper<S, P>
where
    S: StockStore,
    P: EventPublisher,
{
    engine: Arc<ReservationEngine<S, P>>,
    interval: Duration,
}

impl<S, P> ExpirySweeper<S, P>
where
    S: StockStore + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(engine: Arc<ReservationEngine<S, P>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawns the sweeper. It stops once `shutdown` turns true or its sender
    /// is dropped.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs the sweep loop on the current task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Expiry sweeper received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.engine.cleanup_expired_reservations().await {
                        Ok(0) => {}
                        Ok(released) => tracing::info!(released, "Released expired reservations"),
                        Err(e) => tracing::warn!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryStockStore, ReservationConfig, StockStore};
    use common::{CustomerId, OrderId, ProductId};
    use event_bus::InMemoryEventBus;

    #[tokio::test]
    async fn test_sweeper_releases_expired_and_stops() {
        let store = InMemoryStockStore::with_stock([("1", 10)]).await;
        let engine = Arc::new(ReservationEngine::with_config(
            store.clone(),
            InMemoryEventBus::new(),
            ReservationConfig {
                reservation_ttl: chrono::Duration::zero(),
            },
        ));
        engine
            .reserve(
                &ProductId::new("1"),
                4,
                &OrderId::new("100"),
                &CustomerId::new("cust-1"),
            )
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = ExpirySweeper::new(engine, Duration::from_millis(10)).spawn(rx);

        let mut released = false;
        for _ in 0..50 {
            let stock = store.get_stock(&ProductId::new("1")).await.unwrap().unwrap();
            if stock.reserved == 0 {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(released);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
