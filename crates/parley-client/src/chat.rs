//! A two-party chat screen's live state.
//!
//! Two live queries feed one queue (mine to them, theirs to me). A single
//! task drains the queue, so each batch is merged and rendered to completion
//! before the next one is looked at and the timeline needs no locking.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_gateway::{DocumentStore, StoreError, Subscription};
use parley_types::events::ChangeBatch;
use parley_types::keys;
use parley_types::models::{ChatMessage, User};
use parley_types::query::Query;

use crate::error::ClientError;
use crate::timeline::{TimelineMerger, TimelineUpdate};
use crate::view::{ChatRow, rows_for};

/// Who is talking to whom. Passed in explicitly rather than read from the
/// preference store.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub current_user_id: String,
    pub peer: User,
}

/// Receives timeline changes. Called from the session's drain task only, so
/// calls never overlap.
pub trait TimelineRenderer: Send + 'static {
    /// Redraw everything.
    fn on_reset(&mut self, rows: &[ChatRow]);

    /// `range` is the new tail. Rows from `first_changed` onward may have
    /// moved because a late message sorted before existing ones. `rows` is
    /// the full timeline.
    fn on_appended(&mut self, range: Range<usize>, first_changed: usize, rows: &[ChatRow]);

    /// A live query failed. It is not retried.
    fn on_error(&mut self, error: &ClientError);
}

/// Which of the two live queries a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => f.write_str("outgoing"),
            Self::Incoming => f.write_str("incoming"),
        }
    }
}

enum Inbound {
    Batch(Direction, ChangeBatch),
    Failed(Direction, StoreError),
}

pub struct ChatSession {
    store: Arc<dyn DocumentStore>,
    ctx: ChatContext,
    rows: watch::Receiver<Arc<Vec<ChatRow>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Subscribe to both directions of the conversation and start rendering.
    pub async fn open<R>(
        store: Arc<dyn DocumentStore>,
        ctx: ChatContext,
        renderer: R,
    ) -> Result<Self, ClientError>
    where
        R: TimelineRenderer,
    {
        let me = ctx.current_user_id.as_str();
        let peer = ctx.peer.id.as_str();

        let outgoing = store.subscribe(conversation_query(me, peer)).await?;
        let incoming = match store.subscribe(conversation_query(peer, me)).await {
            Ok(sub) => sub,
            Err(e) => {
                outgoing.release().await;
                return Err(e.into());
            }
        };

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (rows_tx, rows_rx) = watch::channel(Arc::new(Vec::new()));

        let tasks = vec![
            tokio::spawn(forward(Direction::Outgoing, outgoing, tx.clone(), cancel.clone())),
            tokio::spawn(forward(Direction::Incoming, incoming, tx, cancel.clone())),
            tokio::spawn(drain(
                rx,
                renderer,
                ctx.current_user_id.clone(),
                rows_tx,
                cancel.clone(),
            )),
        ];

        info!(peer = %ctx.peer.id, "Chat opened");
        Ok(Self {
            store,
            ctx,
            rows: rows_rx,
            cancel,
            tasks,
        })
    }

    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    /// The timeline as last rendered.
    pub fn snapshot(&self) -> Arc<Vec<ChatRow>> {
        self.rows.borrow().clone()
    }

    /// Receiver that changes whenever the rendered timeline does.
    pub fn watch(&self) -> watch::Receiver<Arc<Vec<ChatRow>>> {
        self.rows.clone()
    }

    /// Store a new message. It shows up in the timeline through the outgoing
    /// live query, not directly. Failures are returned, never retried.
    pub async fn send(&self, body: &str) -> Result<ChatMessage, ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::SessionClosed);
        }
        if body.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let fields =
            ChatMessage::new_fields(&self.ctx.current_user_id, &self.ctx.peer.id, body, Utc::now());
        let doc = self
            .store
            .add(keys::COLLECTION_CHAT, fields)
            .await
            .inspect_err(|e| warn!("Message not sent: {}", e))?;

        Ok(ChatMessage::try_from(&doc)?)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Release both live queries and wait until the renderer is no longer
    /// called.
    pub async fn close(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Chat task ended abnormally: {}", e);
            }
        }
        info!(peer = %self.ctx.peer.id, "Chat closed");
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        // Tasks observe the token and release their subscriptions themselves
        self.cancel.cancel();
    }
}

fn conversation_query(sender_id: &str, receiver_id: &str) -> Query {
    Query::collection(keys::COLLECTION_CHAT)
        .where_eq(keys::SENDER_ID, sender_id)
        .where_eq(keys::RECEIVER_ID, receiver_id)
}

async fn forward(
    direction: Direction,
    mut subscription: Subscription,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = subscription.next() => event,
        };

        let inbound = match event {
            Some(Ok(batch)) => Inbound::Batch(direction, batch),
            Some(Err(e)) => Inbound::Failed(direction, e),
            None => {
                debug!(%direction, "Live query ended");
                break;
            }
        };
        if tx.send(inbound).is_err() {
            break;
        }
    }

    subscription.release().await;
}

async fn drain<R>(
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    mut renderer: R,
    current_user_id: String,
    rows_tx: watch::Sender<Arc<Vec<ChatRow>>>,
    cancel: CancellationToken,
) where
    R: TimelineRenderer,
{
    let mut merger = TimelineMerger::new();

    loop {
        let inbound = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            inbound = rx.recv() => match inbound {
                Some(inbound) => inbound,
                None => break,
            },
        };

        match inbound {
            Inbound::Batch(direction, batch) => {
                let update = merger.apply_batch(&batch);
                debug!(%direction, changes = batch.changes.len(), ?update, "Chat batch applied");

                if update == TimelineUpdate::Unchanged {
                    continue;
                }
                let rows = Arc::new(rows_for(merger.messages(), &current_user_id));
                match update {
                    TimelineUpdate::Reset { .. } => renderer.on_reset(&rows),
                    TimelineUpdate::Appended {
                        range,
                        first_changed,
                    } => renderer.on_appended(range, first_changed, &rows),
                    TimelineUpdate::Unchanged => {}
                }
                rows_tx.send_replace(rows);
            }
            Inbound::Failed(direction, e) => {
                warn!(%direction, "Live query failed: {}", e);
                renderer.on_error(&ClientError::Store(e));
            }
        }
    }
}
