use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{OrderError, Result};
use crate::order::Order;
use crate::repository::OrderRepository;

const ORDER_COLUMNS: &str = "id, order_number, customer_id, status, payment_status, items, total_amount, expected_item_count, reserved_item_count, counted_reservations, cancellation_reason, outbox, version, created_at, updated_at";

/// PostgreSQL-backed order repository with an optimistic version column.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;

        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            order_number: row.try_get("order_number")?,
            customer_id: row
                .try_get::<Option<String>, _>("customer_id")?
                .map(CustomerId::new),
            status: status.parse().map_err(OrderError::Persistence)?,
            payment_status: payment_status.parse().map_err(OrderError::Persistence)?,
            items: serde_json::from_value(row.try_get("items")?)?,
            total_amount: row
                .try_get::<Option<i64>, _>("total_amount")?
                .map(Money::from_cents),
            expected_item_count: to_count(row.try_get("expected_item_count")?)?,
            reserved_item_count: to_count(row.try_get("reserved_item_count")?)?,
            counted_reservations: serde_json::from_value(row.try_get("counted_reservations")?)?,
            cancellation_reason: row.try_get("cancellation_reason")?,
            outbox: serde_json::from_value(row.try_get("outbox")?)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn to_count(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| OrderError::Persistence(format!("stored count out of range: {value}")))
}

fn to_column(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| OrderError::Persistence(format!("count out of range: {value}")))
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn insert(&self, order: &Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, customer_id, status, payment_status, items,
                total_amount, expected_item_count, reserved_item_count, counted_reservations,
                cancellation_reason, outbox, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id.as_str())
        .bind(&order.order_number)
        .bind(order.customer_id.as_ref().map(CustomerId::as_str))
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(serde_json::to_value(&order.items)?)
        .bind(order.total_amount.map(|m| m.cents()))
        .bind(to_column(order.expected_item_count)?)
        .bind(to_column(order.reserved_item_count)?)
        .bind(serde_json::to_value(&order.counted_reservations)?)
        .bind(&order.cancellation_reason)
        .bind(serde_json::to_value(&order.outbox)?)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, order: &Order) -> Result<Order> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_id = $3, status = $4, payment_status = $5, items = $6,
                total_amount = $7, expected_item_count = $8, reserved_item_count = $9,
                counted_reservations = $10, cancellation_reason = $11, outbox = $12,
                updated_at = $13, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.version)
        .bind(order.customer_id.as_ref().map(CustomerId::as_str))
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(serde_json::to_value(&order.items)?)
        .bind(order.total_amount.map(|m| m.cents()))
        .bind(to_column(order.expected_item_count)?)
        .bind(to_column(order.reserved_item_count)?)
        .bind(serde_json::to_value(&order.counted_reservations)?)
        .bind(&order.cancellation_reason)
        .bind(serde_json::to_value(&order.outbox)?)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order.id.as_str())
                .fetch_optional(&self.pool)
                .await?;

            return Err(match actual {
                Some(actual) => OrderError::Conflict {
                    order_id: order.id.clone(),
                    expected: order.version,
                    actual,
                },
                None => OrderError::NotFound(order.id.clone()),
            });
        }

        let mut saved = order.clone();
        saved.version += 1;
        Ok(saved)
    }
}
