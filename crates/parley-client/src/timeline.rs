//! Conversation timeline: a sorted, de-duplicated fold over the change batches
//! of the two live queries that make up a chat (mine to them, theirs to me).

use std::collections::HashSet;
use std::ops::Range;

use tracing::{debug, warn};

use parley_types::events::{ChangeBatch, ChangeKind};
use parley_types::models::ChatMessage;

/// What a renderer has to redraw after one batch was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineUpdate {
    /// The timeline was empty before this batch: redraw everything.
    Reset { len: usize },

    /// `range` is the new tail, `range.len()` the number of messages added.
    /// A late message sorts into the middle, so rows from `first_changed`
    /// onward may have moved.
    Appended {
        range: Range<usize>,
        first_changed: usize,
    },

    /// Nothing new: every record was already present or not an addition.
    Unchanged,
}

/// Messages ordered by `sent_at`, unique by store id.
///
/// Equal timestamps keep arrival order.
#[derive(Debug, Default)]
pub struct TimelineMerger {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl TimelineMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    /// Apply one live-query batch. Only additions are merged; modifications
    /// and removals do not occur for chat messages and are skipped, as are
    /// documents that don't decode.
    pub fn apply_batch(&mut self, batch: &ChangeBatch) -> TimelineUpdate {
        let mut incoming = Vec::with_capacity(batch.changes.len());
        let mut ignored = 0usize;

        for change in &batch.changes {
            if change.kind != ChangeKind::Added {
                ignored += 1;
                continue;
            }
            match ChatMessage::try_from(&change.document) {
                Ok(message) => incoming.push(message),
                Err(e) => warn!("Dropping undecodable chat document: {}", e),
            }
        }

        if ignored > 0 {
            debug!(ignored, "Ignored non-add changes in chat batch");
        }

        self.apply(incoming)
    }

    /// Merge newly added messages and report what changed.
    pub fn apply<I>(&mut self, incoming: I) -> TimelineUpdate
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        let was_empty = self.messages.is_empty();
        let before = self.messages.len();

        let mut fresh = HashSet::new();
        for message in incoming {
            if self.ids.insert(message.id.clone()) {
                fresh.insert(message.id.clone());
                self.messages.push(message);
            }
        }

        // Stable: ties keep arrival order
        self.messages.sort_by_key(|m| m.sent_at);

        if was_empty {
            return TimelineUpdate::Reset {
                len: self.messages.len(),
            };
        }
        if fresh.is_empty() {
            return TimelineUpdate::Unchanged;
        }

        let first_changed = self
            .messages
            .iter()
            .position(|m| fresh.contains(&m.id))
            .unwrap_or(before);

        TimelineUpdate::Appended {
            range: before..self.messages.len(),
            first_changed,
        }
    }
}

impl<'a> IntoIterator for &'a TimelineMerger {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
