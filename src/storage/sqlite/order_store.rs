//! SQLite OrderStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{OnConflict, Order as SortOrder, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::model::Order;
use crate::storage::schema::{Orders, CREATE_ORDERS_TABLE};
use crate::storage::{OrderStore, Result, StorageError};

/// SQLite implementation of OrderStore.
///
/// `event_id` carries a UNIQUE constraint; inserts use
/// `ON CONFLICT (event_id) DO NOTHING`.
pub struct SqliteOrderStore {
    pool: SqlitePool,
}

impl SqliteOrderStore {
    /// Create a new SQLite order store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_ORDERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

pub(crate) fn parse_created_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("created_at '{}': {}", raw, e)))
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn insert_if_absent(&self, event_id: &str, order: &Order) -> Result<()> {
        let created_at = order
            .created_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        let query = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::Id,
                Orders::EventId,
                Orders::ProductId,
                Orders::Qty,
                Orders::CreatedAt,
            ])
            .values_panic([
                order.id.as_str().into(),
                event_id.into(),
                order.product_id.as_str().into(),
                order.qty.into(),
                created_at.into(),
            ])
            .on_conflict(OnConflict::column(Orders::EventId).do_nothing().to_owned())
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let query = Query::select()
            .columns([
                Orders::Id,
                Orders::EventId,
                Orders::ProductId,
                Orders::Qty,
                Orders::CreatedAt,
            ])
            .from(Orders::Table)
            .order_by(Orders::CreatedAt, SortOrder::Asc)
            .order_by(Orders::Id, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: String = row.try_get("created_at")?;
            orders.push(Order {
                id: row.try_get("id")?,
                event_id: row.try_get("event_id")?,
                product_id: row.try_get("product_id")?,
                qty: row.try_get("qty")?,
                created_at: parse_created_at(&created_at)?,
            });
        }

        Ok(orders)
    }
}
