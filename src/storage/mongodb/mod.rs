//! MongoDB implementations of storage interfaces.

mod order_store;

pub use order_store::MongoOrderStore;

/// Collection names.
pub(crate) const ORDERS_COLLECTION: &str = "orders";

