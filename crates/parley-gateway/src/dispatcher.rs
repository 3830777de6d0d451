use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use parley_types::events::{ChangeBatch, ChangeKind, DocumentChange};
use parley_types::models::Document;
use parley_types::query::Query;

use crate::error::StoreError;
use crate::subscription::Subscription;

/// What a live query's channel carries.
pub type LiveEvent = Result<ChangeBatch, StoreError>;

/// Routes committed document changes to the live queries they match.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// subscription_id -> (query, sender)
    live_queries: RwLock<HashMap<Uuid, LiveQuery>>,
}

struct LiveQuery {
    query: Query,
    tx: mpsc::UnboundedSender<LiveEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live query. Every change published after this call that
    /// matches `query` is delivered to the returned subscription.
    pub async fn register(&self, query: Query) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        debug!(%id, collection = %query.collection, filters = query.filters.len(), "Live query registered");
        self.inner
            .live_queries
            .write()
            .await
            .insert(id, LiveQuery { query, tx });

        Subscription::new(id, rx, self.clone())
    }

    /// Drop a live query. Unknown ids are ignored.
    pub async fn unregister(&self, id: Uuid) {
        if self.inner.live_queries.write().await.remove(&id).is_some() {
            debug!(%id, "Live query released");
        }
    }

    /// Number of registered live queries, including ones whose receiver is
    /// gone but which have not been pruned yet.
    pub async fn live_query_count(&self) -> usize {
        self.inner.live_queries.read().await.len()
    }

    /// Announce one newly added document.
    pub async fn publish(&self, document: &Document) {
        self.publish_changes(vec![DocumentChange::added(document.clone())])
            .await;
    }

    /// Announce one document whose fields changed.
    pub async fn publish_modified(&self, document: &Document) {
        self.publish_changes(vec![DocumentChange {
            kind: ChangeKind::Modified,
            document: document.clone(),
        }])
        .await;
    }

    /// Fan a set of changes out as one batch per matching live query. Live
    /// queries whose receiver has been dropped are pruned.
    pub async fn publish_changes(&self, changes: Vec<DocumentChange>) {
        let mut closed = Vec::new();

        {
            let live_queries = self.inner.live_queries.read().await;
            for (&id, live) in live_queries.iter() {
                let matching: Vec<DocumentChange> = changes
                    .iter()
                    .filter(|c| live.query.matches(&c.document))
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    continue;
                }

                trace!(%id, count = matching.len(), "Delivering change batch");
                let batch = ChangeBatch {
                    initial: false,
                    changes: matching,
                };
                if live.tx.send(Ok(batch)).is_err() {
                    closed.push(id);
                }
            }
        }

        if !closed.is_empty() {
            let mut live_queries = self.inner.live_queries.write().await;
            for id in closed {
                live_queries.remove(&id);
                debug!(%id, "Pruned abandoned live query");
            }
        }
    }

    /// Terminate every live query with an error and forget them all.
    pub async fn close_all(&self, reason: &str) {
        let mut live_queries = self.inner.live_queries.write().await;
        for (_, live) in live_queries.drain() {
            let _ = live.tx.send(Err(StoreError::Closed(reason.to_string())));
        }
    }
}
