//! ordermesh - event-driven order microservices
//!
//! A gateway publishes `order.created` events and reads data back over
//! broker request/reply. The order service materializes events
//! idempotently; the product service answers lookups through an optional
//! flag-gated cache. Connected clients receive materialized orders live.

pub mod bus;
pub mod cache;
pub mod config;
pub mod flags;
pub mod gateway;
pub mod handlers;
pub mod model;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;
