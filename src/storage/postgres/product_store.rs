//! PostgreSQL ProductStore implementation.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use sea_query::{Expr, OnConflict, Order as SortOrder, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::model::Product;
use crate::storage::schema::{Products, CREATE_PRODUCTS_TABLE};
use crate::storage::{default_products, ProductStore, Result};
use crate::utils::retry::connection_backoff;

/// PostgreSQL implementation of ProductStore.
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Create a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with exponential backoff.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = (|| PgPool::connect(url))
            .retry(connection_backoff())
            .notify(|err: &sqlx::Error, dur: Duration| {
                warn!(service = "postgres", error = %err, delay = ?dur, "Connection failed, retrying");
            })
            .await?;

        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_PRODUCTS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert the default catalog, leaving existing rows untouched.
    pub async fn seed_defaults(&self) -> Result<()> {
        for product in default_products() {
            let query = Query::insert()
                .into_table(Products::Table)
                .columns([Products::Id, Products::Name, Products::Price])
                .values_panic([
                    product.id.into(),
                    product.name.into(),
                    product.price.into(),
                ])
                .on_conflict(OnConflict::column(Products::Id).do_nothing().to_owned())
                .to_string(PostgresQueryBuilder);

            sqlx::query(&query).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn product_from_row(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let query = Query::select()
            .columns([Products::Id, Products::Name, Products::Price])
            .from(Products::Table)
            .and_where(Expr::col(Products::Id).eq(id))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let query = Query::select()
            .columns([Products::Id, Products::Name, Products::Price])
            .from(Products::Table)
            .order_by(Products::Id, SortOrder::Asc)
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(product_from_row).collect()
    }
}
