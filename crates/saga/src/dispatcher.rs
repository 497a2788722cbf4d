//! Consumer pool feeding the saga coordinator.
//!
//! Envelopes arriving from the bus are decoded and routed to one of N worker
//! tasks by hashing the order id. All events of one order are therefore
//! handled sequentially, while different orders proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use common::OrderId;
use event_bus::{EventEnvelope, EventPublisher, IntegrationEvent, Subscription};
use inventory::StockStore;
use orders::OrderRepository;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::coordinator::SagaCoordinator;
use crate::query::OrderQuery;
use crate::retry::{RetryConfig, with_retry};

/// Configuration for the consumer pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Events buffered per worker before routing applies backpressure.
    pub queue_capacity: usize,
    /// Whole-handler retry for transient failures.
    pub retry: RetryConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            retry: RetryConfig::default(),
        }
    }
}

/// Routes bus events to the saga coordinator.
pub struct EventDispatcher<R, S, P, Q>
where
    R: OrderRepository,
    S: StockStore,
    P: EventPublisher,
    Q: OrderQuery,
{
    coordinator: Arc<SagaCoordinator<R, S, P, Q>>,
    config: DispatcherConfig,
}

impl<R, S, P, Q> EventDispatcher<R, S, P, Q>
where
    R: OrderRepository + 'static,
    S: StockStore + 'static,
    P: EventPublisher + 'static,
    Q: OrderQuery + 'static,
{
    pub fn new(coordinator: Arc<SagaCoordinator<R, S, P, Q>>, config: DispatcherConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Returns the worker index that owns an order.
    pub fn worker_for(order_id: &OrderId, workers: usize) -> usize {
        worker_index(order_id, workers)
    }

    /// Spawns the router and its workers.
    ///
    /// The router stops when `shutdown` turns true or the bus closes; workers
    /// then drain what is already queued before the returned handle completes.
    /// While a worker queue is full the router waits and the subscription
    /// buffers, so no event is skipped.
    pub fn spawn(
        self,
        events: Subscription,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, shutdown))
    }

    async fn run(
        self,
        mut events: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let workers = self.config.workers.max(1);
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                index,
                self.coordinator.clone(),
                self.config.retry.clone(),
                rx,
            )));
        }
        tracing::info!(workers, "Event dispatcher started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Event dispatcher received shutdown signal");
                        break;
                    }
                }
                received = events.recv() => match received {
                    Some(envelope) => {
                        route(envelope, &senders, SagaCoordinator::<R, S, P, Q>::consumes).await
                    }
                    None => {
                        tracing::info!("Event bus closed");
                        break;
                    }
                },
            }
        }

        drop(senders);
        futures_util::future::join_all(handles).await;
        tracing::info!("Event dispatcher stopped");
    }
}

async fn route(
    envelope: EventEnvelope,
    senders: &[mpsc::Sender<IntegrationEvent>],
    consumes: fn(&str) -> bool,
) {
    if !consumes(&envelope.topic) {
        tracing::trace!(topic = %envelope.topic, "Skipping topic");
        return;
    }

    let event = match IntegrationEvent::from_envelope(&envelope) {
        Ok(event) => event,
        Err(e) => {
            // Malformed payloads are dropped rather than retried forever.
            metrics::counter!("saga_handler_errors_total", "topic" => envelope.topic.clone())
                .increment(1);
            tracing::error!(
                topic = %envelope.topic,
                event_id = %envelope.event_id,
                error = %e,
                "Dropping undecodable event"
            );
            return;
        }
    };

    let index = worker_index(event.order_id(), senders.len());
    if senders[index].send(event).await.is_err() {
        tracing::error!(worker = index, "Worker stopped, event dropped");
    }
}

fn worker_index(order_id: &OrderId, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    order_id.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

async fn run_worker<R, S, P, Q>(
    index: usize,
    coordinator: Arc<SagaCoordinator<R, S, P, Q>>,
    retry: RetryConfig,
    mut queue: mpsc::Receiver<IntegrationEvent>,
) where
    R: OrderRepository,
    S: StockStore,
    P: EventPublisher,
    Q: OrderQuery,
{
    while let Some(event) = queue.recv().await {
        let coordinator = &coordinator;
        let event = &event;
        let result = with_retry(&retry, event.topic(), move || async move {
            coordinator.handle(event).await
        })
        .await;

        if let Err(e) = result {
            tracing::error!(
                worker = index,
                topic = event.topic(),
                order_id = %event.order_id(),
                error = %e,
                "Event handling failed permanently"
            );
        }
    }
}
