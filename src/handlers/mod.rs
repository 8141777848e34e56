//! Message handlers and the gateway-side core.
//!
//! - `materializer`: `order.created` → order store, idempotent
//! - `command`: create-order requests → `order.created`
//! - `query`: request/reply reads with a bounded wait
//! - `stream`: live fan-out of created orders to client streams
//! - `responders`: service-side answers to the query subjects

pub mod command;
pub mod materializer;
pub mod query;
pub mod responders;
pub mod stream;

pub use command::{CommandError, CommandPublisher};
pub use materializer::{MaterializeOutcome, Materializer, MaterializerConfig};
pub use query::{QueryBridge, QueryError};
pub use responders::{OrdersResponder, ProductResponder};
pub use stream::{OrderFanout, OrderSubscription};
