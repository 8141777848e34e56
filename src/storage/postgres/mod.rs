//! PostgreSQL implementations of storage interfaces.

mod product_store;

pub use product_store::PostgresProductStore;
