//! Saga coordinator reacting to fulfillment events.

use std::sync::Arc;

use common::{CustomerId, Money, OrderId, ProductId};
use event_bus::{
    EventPublisher, IntegrationEvent, InventoryReserveFailed, InventoryReserved, LineItem,
    OrderCancelled, OrderCompleted, OrderConfirmed, OrderCreated, PaymentFailed, PaymentInitiate,
    PaymentSucceeded, topics,
};
use inventory::{
    BulkReserveOutcome, InventoryError, ReleaseReason, ReservationEngine, StockStore,
};
use orders::{Order, OrderRepository, OrderStatus, PendingEvent};

use crate::error::{Result, SagaError};
use crate::policy::{self, Verdict};
use crate::query::OrderQuery;
use crate::retry::{RetryConfig, with_retry, with_retry_when};

/// How an event was dealt with.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event changed state or triggered effects.
    Applied,
    /// The event was late, duplicate or irrelevant.
    Ignored(&'static str),
}

/// Drives orders through reservation, confirmation, payment and cancellation.
///
/// Every handler is idempotent: events may be delivered more than once and
/// the coordinator consumes its own `inventory.reserved` events back.
/// Outbound events are staged in the order's outbox and saved with the state
/// change, then published; a redelivery finishes any publish left undone.
pub struct SagaCoordinator<R, S, P, Q>
where
    R: OrderRepository,
    S: StockStore,
    P: EventPublisher,
    Q: OrderQuery,
{
    orders: R,
    engine: Arc<ReservationEngine<S, P>>,
    publisher: P,
    query: Q,
    retry: RetryConfig,
}

impl<R, S, P, Q> SagaCoordinator<R, S, P, Q>
where
    R: OrderRepository,
    S: StockStore,
    P: EventPublisher,
    Q: OrderQuery,
{
    /// Creates a new saga coordinator.
    pub fn new(orders: R, engine: Arc<ReservationEngine<S, P>>, publisher: P, query: Q) -> Self {
        Self {
            orders,
            engine,
            publisher,
            query,
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the persistence retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the order repository.
    pub fn orders(&self) -> &R {
        &self.orders
    }

    /// Returns the reservation engine.
    pub fn engine(&self) -> &Arc<ReservationEngine<S, P>> {
        &self.engine
    }

    /// Returns true if the coordinator handles events on `topic`.
    pub fn consumes(topic: &str) -> bool {
        matches!(
            topic,
            topics::ORDER_CREATED
                | topics::ORDER_COMPLETED
                | topics::ORDER_CANCELLED
                | topics::PAYMENT_SUCCESS
                | topics::PAYMENT_FAILED
                | topics::INVENTORY_RESERVED
                | topics::INVENTORY_RESERVE_FAILED
        )
    }

    /// Handles one inbound event.
    #[tracing::instrument(skip(self, event), fields(topic = event.topic(), order_id = %event.order_id()))]
    pub async fn handle(&self, event: &IntegrationEvent) -> Result<Outcome> {
        let start = std::time::Instant::now();

        let result = match event {
            IntegrationEvent::OrderCreated(e) => self.on_order_created(e).await,
            IntegrationEvent::InventoryReserved(e) => self.on_inventory_reserved(e).await,
            IntegrationEvent::InventoryReserveFailed(e) => self.on_reserve_failed(e).await,
            IntegrationEvent::PaymentSucceeded(e) => self.on_payment_succeeded(e).await,
            IntegrationEvent::PaymentFailed(e) => self.on_payment_failed(e).await,
            IntegrationEvent::OrderCompleted(e) => self.on_order_completed(e).await,
            IntegrationEvent::OrderCancelled(e) => self.on_order_cancelled(e).await,
            IntegrationEvent::OrderConfirmed(_)
            | IntegrationEvent::PaymentInitiate(_)
            | IntegrationEvent::InventoryReleased(_) => Ok(Outcome::Ignored("topic not consumed")),
        };

        metrics::histogram!("saga_handler_duration_seconds", "topic" => event.topic())
            .record(start.elapsed().as_secs_f64());
        match &result {
            Ok(Outcome::Applied) => {
                metrics::counter!("saga_events_handled_total", "topic" => event.topic())
                    .increment(1);
            }
            Ok(Outcome::Ignored(reason)) => {
                metrics::counter!("saga_events_ignored_total", "topic" => event.topic())
                    .increment(1);
                tracing::debug!(reason, "Event ignored");
            }
            Err(e) => {
                metrics::counter!("saga_handler_errors_total", "topic" => event.topic())
                    .increment(1);
                tracing::warn!(error = %e, "Event handling failed");
            }
        }

        result
    }

    async fn on_order_created(&self, event: &OrderCreated) -> Result<Outcome> {
        if let Some(existing) = self.orders.get(&event.order_id).await? {
            return self.resume(existing, "order already exists").await;
        }
        if event.items.is_empty() {
            return Err(SagaError::IncompletePayload {
                order_id: event.order_id.clone(),
                reason: "order has no items".to_string(),
            });
        }

        let (customer_id, total_amount) = self.enrich(event).await?;
        let mut order = Order::new(
            event.order_id.clone(),
            event.order_number.clone(),
            Some(customer_id.clone()),
            event.items.clone(),
            total_amount,
        );

        // Reserving first is safe: reservations are idempotent per order and
        // product, so a redelivery after a failed insert picks them up again.
        let outcome = self
            .engine
            .bulk_reserve(&order.items, &order.id, &customer_id)
            .await?;

        match outcome {
            BulkReserveOutcome::Reserved(reservations) => {
                let count = reservations.len();
                let events: Vec<IntegrationEvent> = reservations
                    .into_iter()
                    .map(|r| {
                        IntegrationEvent::InventoryReserved(InventoryReserved {
                            reservation_id: r.id,
                            product_id: r.product_id,
                            quantity: r.quantity,
                            order_id: r.order_id,
                            customer_id: r.customer_id,
                        })
                    })
                    .collect();
                stage(&mut order, &events)?;

                if !self.insert_order(&order).await? {
                    let existing = self.load(&order.id).await?;
                    return self.resume(existing, "order already exists").await;
                }
                tracing::info!(reservations = count, "Order reserved");
                self.flush_outbox(order).await?;
            }
            BulkReserveOutcome::Rejected {
                reason,
                unavailable_items,
            } => {
                order.cancel(reason.clone())?;
                let failed = IntegrationEvent::InventoryReserveFailed(InventoryReserveFailed {
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    customer_id,
                    reason,
                    unavailable_items,
                });
                stage(&mut order, &[failed])?;

                if !self.insert_order(&order).await? {
                    let existing = self.load(&order.id).await?;
                    return self.resume(existing, "order already exists").await;
                }
                tracing::info!("Order cancelled for lack of stock");
                self.flush_outbox(order).await?;
            }
        }

        Ok(Outcome::Applied)
    }

    async fn on_inventory_reserved(&self, event: &InventoryReserved) -> Result<Outcome> {
        let order = self.load(&event.order_id).await?;
        let mut updated = match policy::on_inventory_reserved(&order, event.reservation_id) {
            Verdict::Ignore(reason) => return self.resume(order, reason).await,
            Verdict::Update(updated) => updated,
        };

        let confirmed = updated.status == OrderStatus::Confirmed;
        if confirmed {
            let customer_id = updated
                .customer_id
                .clone()
                .unwrap_or_else(|| event.customer_id.clone());
            let amount = updated.total_or_zero();
            let events = [
                IntegrationEvent::OrderConfirmed(OrderConfirmed {
                    order_id: updated.id.clone(),
                    order_number: updated.order_number.clone(),
                    customer_id: customer_id.clone(),
                    total_amount: amount,
                }),
                IntegrationEvent::PaymentInitiate(PaymentInitiate {
                    order_id: updated.id.clone(),
                    order_number: updated.order_number.clone(),
                    customer_id,
                    amount,
                }),
            ];
            stage(&mut updated, &events)?;
        }

        let saved = self.orders.save(&updated).await?;
        if confirmed {
            tracing::info!("All items reserved, order confirmed");
        } else {
            tracing::debug!(
                reserved = saved.reserved_item_count,
                expected = saved.expected_item_count,
                "Reservation counted"
            );
        }
        self.flush_outbox(saved).await?;

        Ok(Outcome::Applied)
    }

    async fn on_reserve_failed(&self, event: &InventoryReserveFailed) -> Result<Outcome> {
        let order = self.load(&event.order_id).await?;
        match policy::on_reserve_failed(&order, &event.reason) {
            Verdict::Ignore(reason) => self.resume(order, reason).await,
            Verdict::Update(updated) => {
                let saved = self.save_with_retry(&updated).await?;
                tracing::info!("Order cancelled after reservation failure");
                self.flush_outbox(saved).await?;
                Ok(Outcome::Applied)
            }
        }
    }

    async fn on_payment_succeeded(&self, event: &PaymentSucceeded) -> Result<Outcome> {
        let order = self.load(&event.order_id).await?;
        match policy::on_payment_succeeded(&order) {
            Verdict::Ignore(reason) => self.resume(order, reason).await,
            Verdict::Update(updated) => {
                let saved = self.orders.save(&updated).await?;
                tracing::info!(transaction_id = %event.transaction_id, "Order paid");
                self.flush_outbox(saved).await?;
                Ok(Outcome::Applied)
            }
        }
    }

    async fn on_payment_failed(&self, event: &PaymentFailed) -> Result<Outcome> {
        let order = self.load(&event.order_id).await?;
        let mut updated = match policy::on_payment_failed(&order, &event.reason) {
            Verdict::Ignore(reason) => return self.resume(order, reason).await,
            Verdict::Update(updated) => updated,
        };

        let cancelled = IntegrationEvent::OrderCancelled(OrderCancelled {
            order_id: updated.id.clone(),
            order_number: Some(updated.order_number.clone()),
            customer_id: updated.customer_id.clone(),
            reason: event.reason.clone(),
        });
        stage(&mut updated, &[cancelled])?;

        let saved = self.save_with_retry(&updated).await?;
        tracing::info!(reason = %event.reason, "Order cancelled after payment failure");
        self.flush_outbox(saved).await?;

        Ok(Outcome::Applied)
    }

    async fn on_order_completed(&self, event: &OrderCompleted) -> Result<Outcome> {
        let completed = self.engine.complete_reservations(&event.order_id).await?;
        if completed.is_empty() {
            return Ok(Outcome::Ignored("no active reservations"));
        }
        Ok(Outcome::Applied)
    }

    async fn on_order_cancelled(&self, event: &OrderCancelled) -> Result<Outcome> {
        let order = match self.orders.get(&event.order_id).await? {
            Some(order) => Some(match policy::on_order_cancelled(&order, &event.reason) {
                Verdict::Update(updated) => {
                    let saved = self.save_with_retry(&updated).await?;
                    tracing::info!(reason = %event.reason, "Order cancelled");
                    self.flush_outbox(saved).await?
                }
                Verdict::Ignore(_) => self.flush_outbox(order).await?,
            }),
            None => None,
        };

        let mut released = 0;
        for product_id in self.products_to_release(&event.order_id, order.as_ref()).await? {
            match self
                .engine
                .release(&product_id, &event.order_id, ReleaseReason::OrderCancelled)
                .await
            {
                Ok(_) => released += 1,
                Err(InventoryError::ReservationNotFound { .. }) => {
                    tracing::debug!(%product_id, "No active reservation to release");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if released == 0 {
            return Ok(Outcome::Ignored("nothing left to release"));
        }
        Ok(Outcome::Applied)
    }

    /// Products whose reservations a cancellation should release: the order's
    /// own items, else the ordering service's view, else whatever is still held.
    async fn products_to_release(
        &self,
        order_id: &OrderId,
        order: Option<&Order>,
    ) -> Result<Vec<ProductId>> {
        let items: Vec<LineItem> = match order {
            Some(order) if !order.items.is_empty() => order.items.clone(),
            _ => match self.query.order_summary(order_id).await? {
                Some(summary) if !summary.items.is_empty() => summary.items,
                _ => {
                    return Ok(distinct(
                        self.engine
                            .reservations_for_order(order_id)
                            .await?
                            .into_iter()
                            .filter(|r| r.is_active())
                            .map(|r| r.product_id),
                    ));
                }
            },
        };
        Ok(distinct(items.into_iter().map(|item| item.product_id)))
    }

    async fn enrich(&self, event: &OrderCreated) -> Result<(CustomerId, Option<Money>)> {
        if let Some(customer_id) = &event.customer_id
            && event.total_amount.is_some()
        {
            return Ok((customer_id.clone(), event.total_amount));
        }

        let summary = self
            .query
            .order_summary(&event.order_id)
            .await?
            .unwrap_or_default();
        let customer_id = event
            .customer_id
            .clone()
            .or(summary.customer_id)
            .ok_or_else(|| SagaError::IncompletePayload {
                order_id: event.order_id.clone(),
                reason: "customer id is unknown".to_string(),
            })?;
        Ok((customer_id, event.total_amount.or(summary.total_amount)))
    }

    /// Publishes events left staged by an earlier attempt, if any.
    async fn resume(&self, order: Order, reason: &'static str) -> Result<Outcome> {
        if !order.has_pending_events() {
            return Ok(Outcome::Ignored(reason));
        }
        tracing::info!(
            pending = order.outbox.len(),
            "Publishing events left over from an earlier attempt"
        );
        self.flush_outbox(order).await?;
        Ok(Outcome::Applied)
    }

    /// Publishes the order's staged events in order and clears them.
    ///
    /// On a publish failure the events already sent are dropped from the
    /// outbox and the rest stay staged for the next delivery.
    async fn flush_outbox(&self, mut order: Order) -> Result<Order> {
        if !order.has_pending_events() {
            return Ok(order);
        }

        let mut sent = 0;
        let mut failure = None;
        for pending in &order.outbox {
            match self.publisher.publish(pending.to_envelope()).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        order.outbox.drain(..sent);

        if let Some(err) = failure {
            if sent > 0
                && let Err(save_err) = self.orders.save(&order).await
            {
                tracing::warn!(error = %save_err, "Could not record partially published outbox");
            }
            return Err(err.into());
        }

        metrics::counter!("saga_outbox_published_total").increment(sent as u64);
        self.save_with_retry(&order).await
    }

    async fn load(&self, order_id: &OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))
    }

    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let orders = &self.orders;
        with_retry(&self.retry, "insert_order", move || async move {
            Ok(orders.insert(order).await?)
        })
        .await
    }

    /// Saves with bounded retry on storage hiccups. Version conflicts are
    /// returned as-is: saving the same copy again cannot succeed.
    async fn save_with_retry(&self, order: &Order) -> Result<Order> {
        let orders = &self.orders;
        with_retry_when(
            &self.retry,
            "save_order",
            |e| matches!(e, SagaError::Order(err) if err.is_transient()),
            move || async move { Ok(orders.save(order).await?) },
        )
        .await
    }
}

fn stage(order: &mut Order, events: &[IntegrationEvent]) -> Result<()> {
    for event in events {
        order.outbox.push(PendingEvent::stage(event)?);
    }
    Ok(())
}

fn distinct(products: impl Iterator<Item = ProductId>) -> Vec<ProductId> {
    let mut seen: Vec<ProductId> = Vec::new();
    for product_id in products {
        if !seen.contains(&product_id) {
            seen.push(product_id);
        }
    }
    seen
}
