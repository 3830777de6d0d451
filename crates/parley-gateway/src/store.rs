use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use parley_db::Database;
use parley_types::events::{ChangeBatch, DocumentChange};
use parley_types::models::Document;
use parley_types::query::Query;

use crate::dispatcher::Dispatcher;
use crate::error::StoreError;
use crate::subscription::Subscription;

/// The document database as seen by the client: schemaless records in named
/// collections, equality queries, and live queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a record; the store assigns its id.
    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError>;

    /// Insert a record unless the collection already holds one whose `key`
    /// equals `value`. Check and insert are atomic. `None` if taken.
    async fn add_unique(
        &self,
        collection: &str,
        key: &str,
        value: Value,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<Document, StoreError>;

    async fn delete_field(&self, collection: &str, id: &str, key: &str) -> Result<Document, StoreError>;

    /// Register a live query. The first batch holds every record already
    /// matching; later batches hold changes as they are committed.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;
}

/// [`DocumentStore`] over a local SQLite database.
#[derive(Clone)]
pub struct LiveStore {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl LiveStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// End every live query with an error. Used on shutdown.
    pub async fn shutdown(&self) {
        info!("Closing all live queries");
        self.dispatcher.close_all("store shut down").await;
    }

    // Run blocking DB work off the async runtime
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }
}

#[async_trait]
impl DocumentStore for LiveStore {
    async fn add(&self, collection: &str, fields: Map<String, Value>) -> Result<Document, StoreError> {
        let collection = collection.to_string();
        let doc = self
            .blocking(move |db| db.insert_document(&collection, fields))
            .await?;

        debug!(id = %doc.id, collection = %doc.collection, "Document added");
        // Only committed documents are announced
        self.dispatcher.publish(&doc).await;
        Ok(doc)
    }

    async fn add_unique(
        &self,
        collection: &str,
        key: &str,
        value: Value,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let (c, k) = (collection.to_string(), key.to_string());
        let Some(doc) = self
            .blocking(move |db| db.insert_document_unless_exists(&c, &k, &value, fields))
            .await?
        else {
            debug!(%collection, %key, "Unique insert refused");
            return Ok(None);
        };

        debug!(id = %doc.id, collection = %doc.collection, "Document added");
        self.dispatcher.publish(&doc).await;
        Ok(Some(doc))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.blocking(move |db| db.get_document(&collection, &id)).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let query = query.clone();
        self.blocking(move |db| db.query_documents(&query)).await
    }

    async fn update_field(
        &self,
        collection: &str,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<Document, StoreError> {
        let (c, i, k) = (collection.to_string(), id.to_string(), key.to_string());
        let doc = self
            .blocking(move |db| db.update_field(&c, &i, &k, value))
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        self.dispatcher.publish_modified(&doc).await;
        Ok(doc)
    }

    async fn delete_field(&self, collection: &str, id: &str, key: &str) -> Result<Document, StoreError> {
        let (c, i, k) = (collection.to_string(), id.to_string(), key.to_string());
        let doc = self
            .blocking(move |db| db.delete_field(&c, &i, &k))
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        self.dispatcher.publish_modified(&doc).await;
        Ok(doc)
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        // Register before taking the snapshot so nothing committed in between
        // is missed. Overlap is filtered by the subscription.
        let mut subscription = self.dispatcher.register(query.clone()).await;

        let existing = match self.query(&query).await {
            Ok(docs) => docs,
            Err(e) => {
                subscription.release().await;
                return Err(e);
            }
        };

        subscription.set_initial(ChangeBatch {
            initial: true,
            changes: existing.into_iter().map(DocumentChange::added).collect(),
        });
        Ok(subscription)
    }
}
