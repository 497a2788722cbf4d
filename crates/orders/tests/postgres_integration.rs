//! PostgreSQL integration tests for the order repository.
//!
//! Require Docker. Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{CustomerId, Money, OrderId, ReservationId};
use event_bus::{IntegrationEvent, LineItem, OrderCompleted};
use orders::{
    Order, OrderError, OrderRepository, OrderStatus, PendingEvent, PostgresOrderRepository,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_fulfillment_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_repository() -> PostgresOrderRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderRepository::new(pool)
}

fn order(id: &str) -> Order {
    Order::new(
        OrderId::new(id),
        format!("ORD-{id}"),
        Some(CustomerId::new("cust-1")),
        vec![LineItem::new("A", 2), LineItem::new("B", 1)],
        Some(Money::from_cents(4999)),
    )
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_and_load() {
    let repo = get_test_repository().await;

    assert!(repo.insert(&order("100")).await.unwrap());
    assert!(!repo.insert(&order("100")).await.unwrap());

    let loaded = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    assert_eq!(loaded.order_number, "ORD-100");
    assert_eq!(loaded.items.len(), 2);
    assert_eq!(loaded.expected_item_count, 2);
    assert_eq!(loaded.total_amount, Some(Money::from_cents(4999)));
    assert_eq!(loaded.status, OrderStatus::Pending);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_save_persists_counter_and_bumps_version() {
    let repo = get_test_repository().await;
    repo.insert(&order("100")).await.unwrap();

    let mut loaded = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    let reservation_id = ReservationId::new();
    loaded.count_reservation(reservation_id);
    let saved = repo.save(&loaded).await.unwrap();
    assert_eq!(saved.version, 1);

    let reloaded = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    assert_eq!(reloaded.reserved_item_count, 1);
    assert_eq!(reloaded.counted_reservations, vec![reservation_id]);
    assert_eq!(reloaded.version, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_save_conflicts() {
    let repo = get_test_repository().await;
    repo.insert(&order("100")).await.unwrap();

    let stale = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    repo.save(&stale).await.unwrap();

    let err = repo.save(&stale).await.unwrap_err();
    assert!(matches!(err, OrderError::Conflict { actual: 1, .. }));

    let err = repo.save(&order("404")).await.unwrap_err();
    assert!(matches!(err, OrderError::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_outbox_is_saved_with_the_order() {
    let repo = get_test_repository().await;
    let mut pending = order("100");
    pending.outbox.push(
        PendingEvent::stage(&IntegrationEvent::OrderCompleted(OrderCompleted {
            order_id: OrderId::new("100"),
        }))
        .unwrap(),
    );
    repo.insert(&pending).await.unwrap();

    let mut loaded = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    assert_eq!(loaded.outbox, pending.outbox);

    loaded.outbox.clear();
    repo.save(&loaded).await.unwrap();
    let reloaded = repo.get(&OrderId::new("100")).await.unwrap().unwrap();
    assert!(!reloaded.has_pending_events());
}
