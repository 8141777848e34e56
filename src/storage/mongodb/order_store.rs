//! MongoDB OrderStore implementation.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::warn;

use crate::model::Order;
use crate::storage::{OrderStore, Result, StorageError};
use crate::utils::retry::connection_backoff;

use super::ORDERS_COLLECTION;

/// MongoDB implementation of OrderStore.
///
/// Inserts are `update_one` upserts filtered on `eventId` with every field
/// under `$setOnInsert`, so a redelivered event never rewrites the record.
pub struct MongoOrderStore {
    orders: Collection<Document>,
}

impl MongoOrderStore {
    /// Create a new MongoDB order store.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let database = client.database(database_name);
        let orders = database.collection(ORDERS_COLLECTION);

        let store = Self { orders };
        store.init().await?;

        Ok(store)
    }

    /// Connect and create indexes, with exponential backoff.
    pub async fn connect(uri: &str, database_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;

        (|| Self::new(&client, database_name))
            .retry(connection_backoff())
            .when(StorageError::is_unavailable)
            .notify(|err: &StorageError, dur: Duration| {
                warn!(service = "mongodb", error = %err, delay = ?dur, "Connection failed, retrying");
            })
            .await
    }

    /// Initialize indexes.
    async fn init(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "eventId": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.orders.create_index(index).await?;

        Ok(())
    }
}

fn order_from_document(doc: &Document) -> Result<Order> {
    let field = |name: &str| {
        doc.get_str(name)
            .map(str::to_string)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", name, e)))
    };

    let qty = doc
        .get_i32("qty")
        .map_err(|e| StorageError::Corrupt(format!("qty: {}", e)))?;
    let millis = doc
        .get_datetime("createdAt")
        .map_err(|e| StorageError::Corrupt(format!("createdAt: {}", e)))?
        .timestamp_millis();
    let created_at: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("createdAt out of range: {}", millis)))?;

    Ok(Order {
        id: field("id")?,
        event_id: field("eventId")?,
        product_id: field("productId")?,
        qty,
        created_at,
    })
}

#[async_trait]
impl OrderStore for MongoOrderStore {
    async fn insert_if_absent(&self, event_id: &str, order: &Order) -> Result<()> {
        let filter = doc! { "eventId": event_id };

        let update = doc! {
            "$setOnInsert": {
                "id": &order.id,
                "eventId": event_id,
                "productId": &order.product_id,
                "qty": order.qty,
                "createdAt": BsonDateTime::from_millis(order.created_at.timestamp_millis()),
            }
        };

        let options = UpdateOptions::builder().upsert(true).build();

        match self
            .orders
            .update_one(filter, update)
            .with_options(options)
            .await
        {
            Ok(_) => Ok(()),
            // Two concurrent upserts can both miss the filter; the loser hits
            // the unique index and the record already exists.
            Err(e) if is_duplicate_key(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let mut cursor = self
            .orders
            .find(doc! {})
            .sort(doc! { "createdAt": 1, "id": 1 })
            .await?;

        let mut orders = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            orders.push(order_from_document(&doc)?);
        }

        Ok(orders)
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}
