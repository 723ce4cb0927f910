use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, max, now, sql};
use diesel::prelude::*;
use diesel::sql_types::{Integer, Nullable, Text, Timestamptz};
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};
use shared::*;
use crate::models::*;
use crate::schema::*;

type DbPool = Pool<AsyncPgConnection>;

const LOG_TABLES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS auto_delivery_log (
    id BIGSERIAL PRIMARY KEY,
    order_id INTEGER NOT NULL,
    order_number VARCHAR(32) NOT NULL,
    customer_email VARCHAR(255),
    processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_auto_delivery_log_order_id ON auto_delivery_log (order_id);
CREATE INDEX IF NOT EXISTS idx_auto_delivery_log_order_number ON auto_delivery_log (order_number);
CREATE INDEX IF NOT EXISTS idx_auto_delivery_log_processed_at ON auto_delivery_log (processed_at);
CREATE INDEX IF NOT EXISTS idx_auto_delivery_log_customer_email ON auto_delivery_log (customer_email);

CREATE TABLE IF NOT EXISTS auto_delivery_errors (
    id BIGSERIAL PRIMARY KEY,
    order_id INTEGER,
    order_number VARCHAR(32),
    message TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_auto_delivery_errors_occurred_at ON auto_delivery_errors (occurred_at);
"#;

/// Data access used by the delivery sweeper.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Creates the audit log and error ledger tables if they are missing.
    async fn ensure_log_tables(&self) -> Result<()>;

    /// Shipped orders whose `shipped_at` is at least `threshold_days` old, oldest first.
    async fn find_eligible(&self, threshold_days: i32) -> Result<Vec<OrderRow>>;

    /// Moves one order from shipped to delivered. Returns the affected row count;
    /// zero means the order was no longer shipped.
    async fn mark_delivered(&self, order_id: i32) -> Result<usize>;

    async fn append_log(&self, entry: AutoDeliveryLogEntry) -> Result<()>;

    async fn record_error(&self, error: SweepError) -> Result<()>;

    /// Aggregates over the audit log and error ledger. Missing tables count as empty.
    async fn log_stats(&self) -> Result<DeliveryStats>;
}

#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: DbPool,
}

impl PgDeliveryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn table_exists(&self, conn: &mut AsyncPgConnection, table: &str) -> Result<bool> {
        let found = diesel::sql_query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1) AS present",
        )
        .bind::<Text, _>(table)
        .get_result::<TablePresence>(conn)
        .await?;
        Ok(found.present)
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn ensure_log_tables(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(LOG_TABLES_DDL).await?;
        Ok(())
    }

    async fn find_eligible(&self, threshold_days: i32) -> Result<Vec<OrderRow>> {
        let mut conn = self.pool.get().await?;

        let cutoff = sql::<Nullable<Timestamptz>>("NOW() - make_interval(days => ")
            .bind::<Integer, _>(threshold_days)
            .sql(")");

        let rows = orders::table
            .filter(orders::status.eq(OrderStatus::Shipped.as_str()))
            .filter(orders::shipped_at.is_not_null())
            .filter(orders::shipped_at.le(cutoff))
            .filter(orders::status.ne(OrderStatus::Delivered.as_str()))
            .order(orders::shipped_at.asc())
            .select((
                orders::id,
                orders::order_number,
                orders::status,
                orders::shipped_at,
                orders::customer_email,
            ))
            .load::<DbOrderRow>(&mut conn)
            .await?;

        Ok(rows.into_iter().map(OrderRow::from).collect())
    }

    async fn mark_delivered(&self, order_id: i32) -> Result<usize> {
        let mut conn = self.pool.get().await?;

        let updated_rows = diesel::update(
            orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::status.eq(OrderStatus::Shipped.as_str())),
        )
        .set((
            orders::status.eq(OrderStatus::Delivered.as_str()),
            orders::delivered_at.eq(sql::<Nullable<Timestamptz>>("NOW()")),
            orders::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await?;

        Ok(updated_rows)
    }

    async fn append_log(&self, entry: AutoDeliveryLogEntry) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(auto_delivery_log::table)
            .values(&NewAutoDeliveryLog::from(entry))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn record_error(&self, error: SweepError) -> Result<()> {
        let mut conn = self.pool.get().await?;

        diesel::insert_into(auto_delivery_errors::table)
            .values(&NewAutoDeliveryError::from(error))
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn log_stats(&self) -> Result<DeliveryStats> {
        let mut conn = self.pool.get().await?;
        let mut stats = DeliveryStats::default();

        if self.table_exists(&mut conn, "auto_delivery_log").await? {
            let (total, last) = auto_delivery_log::table
                .select((count_star(), max(auto_delivery_log::processed_at)))
                .first::<(i64, Option<DateTime<Utc>>)>(&mut conn)
                .await?;
            stats.total_processed = total;
            stats.last_processed = last;
        }

        if self.table_exists(&mut conn, "auto_delivery_errors").await? {
            stats.error_count = auto_delivery_errors::table
                .count()
                .get_result::<i64>(&mut conn)
                .await?;
        }

        Ok(stats)
    }
}
