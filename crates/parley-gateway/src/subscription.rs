use std::collections::HashSet;

use tokio::sync::mpsc;
use uuid::Uuid;

use parley_types::events::{ChangeBatch, ChangeKind};

use crate::dispatcher::{Dispatcher, LiveEvent};

/// Handle to one registered live query.
///
/// Dropping the handle stops delivery: the dispatcher notices the closed
/// channel on its next publish and prunes the registration. [`release`]
/// unregisters eagerly.
///
/// [`release`]: Subscription::release
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<LiveEvent>,
    dispatcher: Dispatcher,
    initial: Option<ChangeBatch>,
    /// Ids delivered in the initial batch that may still arrive live.
    snapshot_ids: HashSet<String>,
}

impl Subscription {
    pub(crate) fn new(id: Uuid, rx: mpsc::UnboundedReceiver<LiveEvent>, dispatcher: Dispatcher) -> Self {
        Self {
            id,
            rx,
            dispatcher,
            initial: None,
            snapshot_ids: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue the documents that already matched at registration time. They
    /// are yielded before any live batch, and a later live `Added` for one of
    /// them is suppressed.
    pub fn set_initial(&mut self, batch: ChangeBatch) {
        self.snapshot_ids = batch.added().map(|d| d.id.clone()).collect();
        self.initial = Some(ChangeBatch {
            initial: true,
            ..batch
        });
    }

    /// Next batch or error. `None` once the live query has ended.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        if let Some(initial) = self.initial.take() {
            return Some(Ok(initial));
        }

        loop {
            let mut batch = match self.rx.recv().await? {
                Ok(batch) => batch,
                Err(e) => return Some(Err(e)),
            };

            if !self.snapshot_ids.is_empty() {
                let snapshot_ids = &mut self.snapshot_ids;
                batch
                    .changes
                    .retain(|c| c.kind != ChangeKind::Added || !snapshot_ids.remove(&c.document.id));
                if batch.is_empty() {
                    continue;
                }
            }

            return Some(Ok(batch));
        }
    }

    /// Unregister from the dispatcher and drop the handle.
    pub async fn release(self) {
        self.dispatcher.unregister(self.id).await;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
