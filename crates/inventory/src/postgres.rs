use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId, ReservationId};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::ledger;
use crate::model::{
    ReleaseReason, Reservation, ReservationRequest, ReservationStatus, StockHistory, StockRecord,
    StockSettings,
};
use crate::store::StockStore;

const STOCK_COLUMNS: &str =
    "product_id, quantity, reserved, reorder_level, max_stock, is_active, updated_at";
const RESERVATION_COLUMNS: &str = "id, product_id, quantity, order_id, customer_id, status, created_at, expires_at, updated_at";

/// PostgreSQL-backed stock store.
///
/// Per-product atomicity comes from `SELECT ... FOR UPDATE` on the stock row
/// inside a transaction.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Creates a new PostgreSQL stock store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations for every fulfillment table.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_stock(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: to_u32(row.try_get("quantity")?)?,
            reserved: to_u32(row.try_get("reserved")?)?,
            reorder_level: to_u32(row.try_get("reorder_level")?)?,
            max_stock: row
                .try_get::<Option<i64>, _>("max_stock")?
                .map(to_u32)
                .transpose()?,
            is_active: row.try_get("is_active")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: to_u32(row.try_get("quantity")?)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            status: status.parse().map_err(InventoryError::Persistence)?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<StockHistory> {
        Ok(StockHistory {
            id: row.try_get("id")?,
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            previous_quantity: to_u32(row.try_get("previous_quantity")?)?,
            current_quantity: to_u32(row.try_get("current_quantity")?)?,
            previous_reserved: to_u32(row.try_get("previous_reserved")?)?,
            current_reserved: to_u32(row.try_get("current_reserved")?)?,
            change: row.try_get("change")?,
            reason: row.try_get("reason")?,
            order_id: row
                .try_get::<Option<String>, _>("order_id")?
                .map(OrderId::new),
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    /// Creates the stock row if missing and locks it for the transaction.
    async fn lock_stock(conn: &mut PgConnection, product_id: &ProductId) -> Result<StockRecord> {
        sqlx::query("INSERT INTO stock (product_id) VALUES ($1) ON CONFLICT (product_id) DO NOTHING")
            .bind(product_id.as_str())
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Self::row_to_stock(row)
    }

    async fn write_stock(conn: &mut PgConnection, stock: &StockRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE stock
            SET quantity = $2, reserved = $3, reorder_level = $4, max_stock = $5,
                is_active = $6, updated_at = $7
            WHERE product_id = $1
            "#,
        )
        .bind(stock.product_id.as_str())
        .bind(i64::from(stock.quantity))
        .bind(i64::from(stock.reserved))
        .bind(i64::from(stock.reorder_level))
        .bind(stock.max_stock.map(i64::from))
        .bind(stock.is_active)
        .bind(stock.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn write_reservation_status(
        conn: &mut PgConnection,
        reservation: &Reservation,
    ) -> Result<()> {
        sqlx::query("UPDATE reservations SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(reservation.id.as_uuid())
            .bind(reservation.status.as_str())
            .bind(reservation.updated_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn insert_history(conn: &mut PgConnection, entry: &StockHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_history (id, product_id, previous_quantity, current_quantity,
                previous_reserved, current_reserved, change, reason, order_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.product_id.as_str())
        .bind(i64::from(entry.previous_quantity))
        .bind(i64::from(entry.current_quantity))
        .bind(i64::from(entry.previous_reserved))
        .bind(i64::from(entry.current_reserved))
        .bind(entry.change)
        .bind(&entry.reason)
        .bind(entry.order_id.as_ref().map(OrderId::as_str))
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

fn to_u32(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| InventoryError::Persistence(format!("stored quantity out of range: {value}")))
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn ensure_stock(&self, product_id: &ProductId) -> Result<StockRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO stock (product_id) VALUES ($1)
            ON CONFLICT (product_id) DO UPDATE SET product_id = EXCLUDED.product_id
            RETURNING {STOCK_COLUMNS}
            "#
        ))
        .bind(product_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_stock(row)
    }

    async fn get_stock(&self, product_id: &ProductId) -> Result<Option<StockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_stock).transpose()
    }

    async fn update_settings(
        &self,
        product_id: &ProductId,
        settings: StockSettings,
    ) -> Result<StockRecord> {
        let mut tx = self.pool.begin().await?;
        let mut stock = Self::lock_stock(&mut tx, product_id).await?;

        stock.reorder_level = settings.reorder_level;
        stock.max_stock = settings.max_stock;
        stock.is_active = settings.is_active;
        stock.updated_at = Utc::now();
        Self::write_stock(&mut tx, &stock).await?;

        tx.commit().await?;
        Ok(stock)
    }

    async fn reserve(&self, request: &ReservationRequest) -> Result<Reservation> {
        let mut tx = self.pool.begin().await?;
        let mut stock = Self::lock_stock(&mut tx, &request.product_id).await?;

        let existing = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE product_id = $1 AND order_id = $2 AND status = 'active'
            "#
        ))
        .bind(request.product_id.as_str())
        .bind(request.order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return Self::row_to_reservation(row);
        }

        let now = Utc::now();
        let before = stock.clone();
        ledger::reserve(&mut stock, request.quantity, now)?;
        let reservation = Reservation::new(request, now);

        Self::write_stock(&mut tx, &stock).await?;
        sqlx::query(
            r#"
            INSERT INTO reservations (id, product_id, quantity, order_id, customer_id, status,
                created_at, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.product_id.as_str())
        .bind(i64::from(reservation.quantity))
        .bind(reservation.order_id.as_str())
        .bind(reservation.customer_id.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await?;
        Self::insert_history(
            &mut tx,
            &StockHistory::between(&before, &stock, "reservation", Some(&request.order_id)),
        )
        .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        order_id: &OrderId,
        reason: ReleaseReason,
    ) -> Result<Option<Reservation>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut stock = Self::row_to_stock(row)?;

        let row = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE product_id = $1 AND order_id = $2 AND status = 'active'
            FOR UPDATE
            "#
        ))
        .bind(product_id.as_str())
        .bind(order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut reservation = Self::row_to_reservation(row)?;

        let before = stock.clone();
        ledger::release(&mut stock, &mut reservation, reason, Utc::now());

        Self::write_stock(&mut tx, &stock).await?;
        Self::write_reservation_status(&mut tx, &reservation).await?;
        Self::insert_history(
            &mut tx,
            &StockHistory::between(&before, &stock, format!("release:{reason}"), Some(order_id)),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(reservation))
    }

    async fn complete_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        let mut tx = self.pool.begin().await?;

        // Lock rows in product order so concurrent completions cannot deadlock.
        let product_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT product_id FROM reservations
            WHERE order_id = $1 AND status = 'active'
            ORDER BY product_id
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let mut completed = Vec::new();
        for product_id in product_ids.into_iter().map(ProductId::new) {
            let mut stock = Self::lock_stock(&mut tx, &product_id).await?;

            let rows = sqlx::query(&format!(
                r#"
                SELECT {RESERVATION_COLUMNS} FROM reservations
                WHERE product_id = $1 AND order_id = $2 AND status = 'active'
                FOR UPDATE
                "#
            ))
            .bind(product_id.as_str())
            .bind(order_id.as_str())
            .fetch_all(&mut *tx)
            .await?;

            for row in rows {
                let mut reservation = Self::row_to_reservation(row)?;
                let before = stock.clone();
                if ledger::complete(&mut stock, &mut reservation, Utc::now()) {
                    Self::write_reservation_status(&mut tx, &reservation).await?;
                    Self::insert_history(
                        &mut tx,
                        &StockHistory::between(&before, &stock, "completion", Some(order_id)),
                    )
                    .await?;
                    completed.push(reservation);
                }
            }

            Self::write_stock(&mut tx, &stock).await?;
        }

        tx.commit().await?;
        Ok(completed)
    }

    async fn adjust(
        &self,
        product_id: &ProductId,
        delta: i64,
        reason: &str,
    ) -> Result<StockRecord> {
        let mut tx = self.pool.begin().await?;
        let mut stock = Self::lock_stock(&mut tx, product_id).await?;

        let before = stock.clone();
        ledger::adjust(&mut stock, delta, Utc::now())?;

        Self::write_stock(&mut tx, &stock).await?;
        Self::insert_history(
            &mut tx,
            &StockHistory::between(&before, &stock, reason, None),
        )
        .await?;

        tx.commit().await?;
        Ok(stock)
    }

    async fn reservations_for_order(&self, order_id: &OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE order_id = $1 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM reservations
            WHERE status = $1 AND expires_at <= $2
            ORDER BY expires_at ASC
            "#
        ))
        .bind(ReservationStatus::Active.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn history(&self, product_id: &ProductId) -> Result<Vec<StockHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, previous_quantity, current_quantity, previous_reserved,
                current_reserved, change, reason, order_id, recorded_at
            FROM stock_history
            WHERE product_id = $1
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(product_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }
}
