//! Domain records exchanged over the broker and persisted by the stores.
//!
//! - [`OrderCreated`]: immutable wire event published on `order.created`
//! - [`Order`]: materialized record, unique per `event_id`
//! - [`Product`]: read-only catalog entry owned by the product store

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised while decoding an `order.created` payload.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid createdAt '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// "An order was requested", published once per client request.
///
/// `id` is the idempotency key the materializer dedups on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub id: String,
    pub product_id: String,
    pub qty: i32,
    pub created_at: String,
}

/// Loose wire shape. Required fields are checked explicitly in
/// [`OrderCreated::decode`] so that a missing field is reported by name.
///
/// Each spelling has its own field so a payload carrying several of them
/// still decodes; the camelCase spelling wins when more than one is set.
#[derive(Debug, Deserialize)]
struct RawOrderCreated {
    id: Option<String>,
    #[serde(rename = "productId")]
    product_id: Option<String>,
    #[serde(rename = "product_id")]
    product_id_snake: Option<String>,
    #[serde(rename = "productID")]
    product_id_upper: Option<String>,
    qty: Option<i32>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    #[serde(rename = "created_at")]
    created_at_snake: Option<String>,
}

impl OrderCreated {
    /// Build a fresh event with a time-ordered id and the current UTC time.
    pub fn new(product_id: impl Into<String>, qty: i32) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            product_id: product_id.into(),
            qty,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Decode and validate a wire payload.
    ///
    /// Unknown fields are ignored. Missing or empty required fields fail.
    /// The timestamp is only checked for presence here; see [`Self::timestamp`].
    pub fn decode(payload: &[u8]) -> Result<Self, EventDecodeError> {
        let raw: RawOrderCreated = serde_json::from_slice(payload)?;

        let id = non_empty(raw.id).ok_or(EventDecodeError::MissingField("id"))?;
        let product_id = non_empty(raw.product_id)
            .or_else(|| non_empty(raw.product_id_snake))
            .or_else(|| non_empty(raw.product_id_upper))
            .ok_or(EventDecodeError::MissingField("productId"))?;
        let qty = raw.qty.ok_or(EventDecodeError::MissingField("qty"))?;
        let created_at = non_empty(raw.created_at)
            .or_else(|| non_empty(raw.created_at_snake))
            .ok_or(EventDecodeError::MissingField("createdAt"))?;

        Ok(Self {
            id,
            product_id,
            qty,
            created_at,
        })
    }

    /// Parse `created_at` as RFC3339.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, EventDecodeError> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|source| EventDecodeError::InvalidTimestamp {
                value: self.created_at.clone(),
                source,
            })
    }

    /// Encode for publishing.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Materialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub event_id: String,
    pub product_id: String,
    pub qty: i32,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Record to persist for a delivered event. Gets its own id; only
    /// `event_id` takes part in deduplication.
    pub fn materialize(event: &OrderCreated, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_id: event.id.clone(),
            product_id: event.product_id.clone(),
            qty: event.qty,
            created_at,
        }
    }

    /// Provisional view returned to the caller right after publishing.
    pub fn provisional(event: &OrderCreated, created_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id.clone(),
            event_id: event.id.clone(),
            product_id: event.product_id.clone(),
            qty: event.qty,
            created_at,
        }
    }
}

/// Catalog entry. `price` is in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: i64,
}

#[cfg(test)]
mod tests;
