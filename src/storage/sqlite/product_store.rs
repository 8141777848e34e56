//! SQLite ProductStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Order as SortOrder, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::model::Product;
use crate::storage::schema::{Products, CREATE_PRODUCTS_TABLE};
use crate::storage::{default_products, ProductStore, Result};

/// SQLite implementation of ProductStore.
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    /// Create a new SQLite product store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
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
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
    })
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let query = Query::select()
            .columns([Products::Id, Products::Name, Products::Price])
            .from(Products::Table)
            .and_where(Expr::col(Products::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let query = Query::select()
            .columns([Products::Id, Products::Name, Products::Price])
            .from(Products::Table)
            .order_by(Products::Id, SortOrder::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(product_from_row).collect()
    }
}
