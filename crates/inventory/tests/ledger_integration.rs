//! End-to-end scenarios for the reservation engine over the in-memory store.

use std::sync::Arc;

use common::{CustomerId, OrderId, ProductId};
use event_bus::{IntegrationEvent, InMemoryEventBus, LineItem, UnavailableItem, topics};
use inventory::{
    BulkReserveOutcome, InMemoryStockStore, InventoryError, ReleaseReason, ReservationConfig,
    ReservationEngine, ReservationStatus, StockSettings, StockStore,
};

struct TestHarness {
    store: InMemoryStockStore,
    bus: InMemoryEventBus,
    engine: Arc<ReservationEngine<InMemoryStockStore, InMemoryEventBus>>,
}

impl TestHarness {
    async fn with_stock(levels: &[(&str, u32)]) -> Self {
        Self::build(levels, ReservationConfig::default()).await
    }

    async fn build(levels: &[(&str, u32)], config: ReservationConfig) -> Self {
        let store = InMemoryStockStore::with_stock(levels.iter().copied()).await;
        let bus = InMemoryEventBus::with_log();
        let engine = Arc::new(ReservationEngine::with_config(
            store.clone(),
            bus.clone(),
            config,
        ));
        Self { store, bus, engine }
    }

    async fn stock(&self, product_id: &str) -> (u32, u32) {
        let stock = self
            .store
            .get_stock(&ProductId::new(product_id))
            .await
            .unwrap()
            .unwrap();
        (stock.quantity, stock.reserved)
    }
}

fn customer() -> CustomerId {
    CustomerId::new("cust-1")
}

#[tokio::test]
async fn test_reserve_then_complete_deducts_stock() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 4, &order, &customer())
        .await
        .unwrap();
    let stock = h.engine.stock(&ProductId::new("1")).await.unwrap().unwrap();
    assert_eq!(stock.available(), 6);

    let completed = h.engine.complete_reservations(&order).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(h.stock("1").await, (6, 0));

    let reservations = h.engine.reservations_for_order(&order).await.unwrap();
    assert_eq!(reservations[0].status, ReservationStatus::Completed);
}

#[tokio::test]
async fn test_reserve_then_cancel_restores_availability() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 4, &order, &customer())
        .await
        .unwrap();
    h.engine
        .release(&ProductId::new("1"), &order, ReleaseReason::OrderCancelled)
        .await
        .unwrap();

    assert_eq!(h.stock("1").await, (10, 0));

    let released = h.bus.events_on(topics::INVENTORY_RELEASED).await.unwrap();
    assert_eq!(released.len(), 1);
    let IntegrationEvent::InventoryReleased(event) = &released[0] else {
        panic!("Expected InventoryReleased event");
    };
    assert_eq!(event.quantity, 4);
    assert_eq!(event.reason, "order_cancelled");

    let envelope = &h.bus.published_on(topics::INVENTORY_RELEASED).await[0];
    assert_eq!(envelope.partition_key, "1");
}

#[tokio::test]
async fn test_release_completed_reason_marks_reservation_completed() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 3, &order, &customer())
        .await
        .unwrap();
    let reservation = h
        .engine
        .release(&ProductId::new("1"), &order, ReleaseReason::OrderCompleted)
        .await
        .unwrap();

    assert_eq!(reservation.status, ReservationStatus::Completed);
    assert_eq!(h.stock("1").await, (10, 0));
}

#[tokio::test]
async fn test_second_release_reports_not_found_and_changes_nothing() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 4, &order, &customer())
        .await
        .unwrap();
    h.engine
        .release(&ProductId::new("1"), &order, ReleaseReason::OrderCancelled)
        .await
        .unwrap();

    let err = h
        .engine
        .release(&ProductId::new("1"), &order, ReleaseReason::OrderCancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::ReservationNotFound { .. }));
    assert_eq!(h.stock("1").await, (10, 0));
    assert_eq!(h.bus.published_on(topics::INVENTORY_RELEASED).await.len(), 1);
}

#[tokio::test]
async fn test_bulk_reserve_compensates_and_reports_unavailable() {
    let h = TestHarness::with_stock(&[("A", 10), ("B", 2)]).await;
    let order = OrderId::new("100");

    let outcome = h
        .engine
        .bulk_reserve(
            &[LineItem::new("A", 5), LineItem::new("B", 5)],
            &order,
            &customer(),
        )
        .await
        .unwrap();

    let BulkReserveOutcome::Rejected {
        unavailable_items, ..
    } = outcome
    else {
        panic!("Expected rejection");
    };
    assert_eq!(
        unavailable_items,
        vec![UnavailableItem {
            product_id: ProductId::new("B"),
            requested_quantity: 5,
            available_quantity: 2,
        }]
    );

    assert_eq!(h.stock("A").await, (10, 0));
    assert_eq!(h.stock("B").await, (2, 0));
    // compensation is internal and emits nothing
    assert_eq!(h.bus.event_count().await, 0);
}

#[tokio::test]
async fn test_compensation_attempts_every_release() {
    let h = TestHarness::with_stock(&[("A", 10), ("B", 10), ("C", 0)]).await;
    let order = OrderId::new("100");
    let items = [
        LineItem::new("A", 2),
        LineItem::new("B", 3),
        LineItem::new("C", 1),
    ];
    h.store.fail_next_release_of("A").await;

    let err = h
        .engine
        .bulk_reserve(&items, &order, &customer())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.stock("A").await, (10, 2));
    assert_eq!(h.stock("B").await, (10, 0));

    // redelivery picks up the leftover reservation and releases it
    let outcome = h
        .engine
        .bulk_reserve(&items, &order, &customer())
        .await
        .unwrap();
    assert!(matches!(outcome, BulkReserveOutcome::Rejected { .. }));
    assert_eq!(h.stock("A").await, (10, 0));
    assert_eq!(h.stock("B").await, (10, 0));
}

#[tokio::test]
async fn test_bulk_reserve_reports_every_unsatisfiable_line() {
    let h = TestHarness::with_stock(&[("A", 1), ("B", 10), ("C", 0)]).await;

    let outcome = h
        .engine
        .bulk_reserve(
            &[
                LineItem::new("A", 2),
                LineItem::new("B", 3),
                LineItem::new("C", 1),
            ],
            &OrderId::new("100"),
            &customer(),
        )
        .await
        .unwrap();

    let BulkReserveOutcome::Rejected {
        unavailable_items, ..
    } = outcome
    else {
        panic!("Expected rejection");
    };
    let products: Vec<&str> = unavailable_items
        .iter()
        .map(|i| i.product_id.as_str())
        .collect();
    assert_eq!(products, vec!["A", "C"]);
    assert_eq!(h.stock("B").await, (10, 0));
}

#[tokio::test]
async fn test_bulk_reserve_merges_duplicate_lines() {
    let h = TestHarness::with_stock(&[("A", 10)]).await;

    let outcome = h
        .engine
        .bulk_reserve(
            &[LineItem::new("A", 3), LineItem::new("A", 4)],
            &OrderId::new("100"),
            &customer(),
        )
        .await
        .unwrap();

    let BulkReserveOutcome::Reserved(reservations) = outcome else {
        panic!("Expected reservations");
    };
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].quantity, 7);
    assert_eq!(h.stock("A").await, (10, 7));
}

#[tokio::test]
async fn test_inactive_product_cannot_be_reserved() {
    let h = TestHarness::with_stock(&[("A", 10)]).await;
    h.engine
        .configure(
            &ProductId::new("A"),
            StockSettings {
                is_active: false,
                ..StockSettings::default()
            },
        )
        .await
        .unwrap();

    let outcome = h
        .engine
        .bulk_reserve(&[LineItem::new("A", 1)], &OrderId::new("100"), &customer())
        .await
        .unwrap();

    let BulkReserveOutcome::Rejected {
        unavailable_items, ..
    } = outcome
    else {
        panic!("Expected rejection");
    };
    assert_eq!(unavailable_items[0].available_quantity, 0);
}

#[tokio::test]
async fn test_negative_adjustment_is_rejected() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;

    let err = h
        .engine
        .adjust(&ProductId::new("1"), -20, "damaged")
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NegativeStock { .. }));
    assert_eq!(h.stock("1").await, (10, 0));

    let history = h.engine.history(&ProductId::new("1")).await.unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_adjustment_is_recorded_in_history() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;

    h.engine
        .adjust(&ProductId::new("1"), 5, "restock")
        .await
        .unwrap();

    let history = h.engine.history(&ProductId::new("1")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_quantity, 10);
    assert_eq!(history[0].current_quantity, 15);
    assert_eq!(history[0].change, 5);
    assert_eq!(history[0].reason, "restock");
}

#[tokio::test]
async fn test_expired_reservations_are_released() {
    let h = TestHarness::build(
        &[("1", 10)],
        ReservationConfig {
            reservation_ttl: chrono::Duration::zero(),
        },
    )
    .await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 4, &order, &customer())
        .await
        .unwrap();
    let released = h.engine.cleanup_expired_reservations().await.unwrap();

    assert_eq!(released, 1);
    assert_eq!(h.stock("1").await, (10, 0));
    assert_eq!(h.engine.cleanup_expired_reservations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_expiry_after_completion_is_a_noop() {
    let h = TestHarness::build(
        &[("1", 10)],
        ReservationConfig {
            reservation_ttl: chrono::Duration::zero(),
        },
    )
    .await;
    let order = OrderId::new("100");

    h.engine
        .reserve(&ProductId::new("1"), 4, &order, &customer())
        .await
        .unwrap();
    h.engine.complete_reservations(&order).await.unwrap();

    assert_eq!(h.engine.cleanup_expired_reservations().await.unwrap(), 0);
    assert_eq!(h.stock("1").await, (6, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_oversell() {
    let h = TestHarness::with_stock(&[("1", 10)]).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .reserve(
                    &ProductId::new("1"),
                    1,
                    &OrderId::new(format!("order-{i}")),
                    &CustomerId::new("cust-1"),
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(InventoryError::InsufficientStock { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(h.stock("1").await, (10, 10));
}
