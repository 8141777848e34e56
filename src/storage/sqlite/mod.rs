//! SQLite implementations of storage interfaces.

mod order_store;
mod product_store;

pub use order_store::SqliteOrderStore;
pub use product_store::SqliteProductStore;
