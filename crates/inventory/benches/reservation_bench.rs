use common::{CustomerId, OrderId, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{InMemoryEventBus, LineItem};
use inventory::{InMemoryStockStore, ReleaseReason, ReservationEngine};

fn bench_reserve_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = rt.block_on(async {
        let store = InMemoryStockStore::with_stock([("1", u32::MAX / 2)]).await;
        ReservationEngine::new(store, InMemoryEventBus::new())
    });
    let product_id = ProductId::new("1");
    let order_id = OrderId::new("100");
    let customer_id = CustomerId::new("cust-1");

    c.bench_function("inventory/reserve_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .reserve(&product_id, 1, &order_id, &customer_id)
                    .await
                    .unwrap();
                engine
                    .release(&product_id, &order_id, ReleaseReason::OrderCancelled)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_bulk_reserve_10_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let customer_id = CustomerId::new("cust-1");
    let items: Vec<LineItem> = (0..10).map(|i| LineItem::new(format!("p-{i}"), 1)).collect();

    c.bench_function("inventory/bulk_reserve_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store =
                    InMemoryStockStore::with_stock((0..10).map(|i| (format!("p-{i}"), 100))).await;
                let engine = ReservationEngine::new(store, InMemoryEventBus::new());
                engine
                    .bulk_reserve(&items, &OrderId::new("100"), &customer_id)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_bulk_reserve_rejected(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let customer_id = CustomerId::new("cust-1");
    let items = vec![
        LineItem::new("A", 5),
        LineItem::new("B", 5),
        LineItem::new("C", 5),
    ];

    c.bench_function("inventory/bulk_reserve_rejected", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStockStore::with_stock([("A", 10), ("B", 10), ("C", 2)]).await;
                let engine = ReservationEngine::new(store, InMemoryEventBus::new());
                engine
                    .bulk_reserve(&items, &OrderId::new("100"), &customer_id)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_release,
    bench_bulk_reserve_10_lines,
    bench_bulk_reserve_rejected,
);
criterion_main!(benches);
