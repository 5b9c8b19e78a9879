use crate::message::{Message, MessageId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Full ordered conversation as seen by observers.
pub type Snapshot = Arc<[Message]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Updated,
    /// The id is already complete; the message was dropped.
    Ignored,
}

/// Ordered, append-or-update message list keyed by [`MessageId`].
///
/// Entries are never removed. A message whose id is already present
/// replaces the stored entry in place, unless that entry has completed.
/// Every change is pushed to subscribers as a [`Snapshot`].
#[derive(Debug)]
pub struct ConversationStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    index: HashMap<MessageId, usize>,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh id; unique for the lifetime of this store.
    pub fn next_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn append(&self, message: Message) -> AppendOutcome {
        let mut inner = self.lock();

        let outcome = match inner.index.get(&message.id).copied() {
            Some(pos) => {
                let existing = &inner.messages[pos];
                if existing.is_complete() {
                    if !existing.same_content(&message) {
                        tracing::warn!(id = %message.id, sender = message.sender.as_str(), "update for completed message ignored");
                    }
                    return AppendOutcome::Ignored;
                }
                inner.messages[pos] = message;
                AppendOutcome::Updated
            }
            None => {
                let pos = inner.messages.len();
                inner.index.insert(message.id, pos);
                inner.messages.push(message);
                AppendOutcome::Inserted
            }
        };

        inner.notify();
        outcome
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Snapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn get(&self, id: MessageId) -> Option<Message> {
        let inner = self.lock();
        inner.index.get(&id).map(|&pos| inner.messages[pos].clone())
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::from(self.lock().messages.as_slice())
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking observer cannot leave the list half-written; keep going.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn notify(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let snap: Snapshot = Arc::from(self.messages.as_slice());
        self.subscribers.retain(|tx| tx.send(Arc::clone(&snap)).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_update_keeps_position() {
        let store = ConversationStore::new();
        let a = store.next_id();
        let b = store.next_id();
        let c = store.next_id();

        store.append(Message::user(a, "one"));
        store.append(Message::ai(b, "", "Streaming llama2", true));
        store.append(Message::user(c, "three"));

        let outcome = store.append(Message::ai(b, "two", "llama2", false));
        assert_eq!(outcome, AppendOutcome::Updated);

        let snap = store.snapshot();
        let ids: Vec<_> = snap.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(snap[1].text, "two");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn replay_of_final_snapshot_is_a_no_op() {
        let store = ConversationStore::new();
        let id = store.next_id();
        let done = Message::ai(id, "Hello", "llama2", false);

        assert_eq!(store.append(done.clone()), AppendOutcome::Inserted);
        assert_eq!(store.append(done.clone()), AppendOutcome::Ignored);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().text, "Hello");
    }

    #[test]
    fn completed_message_rejects_late_updates() {
        let store = ConversationStore::new();
        let id = store.next_id();
        store.append(Message::ai(id, "", "Streaming x", true));
        store.append(Message::ai(id, "final", "x", false));

        let outcome = store.append(Message::ai(id, "final plus junk", "Streaming x", true));
        assert_eq!(outcome, AppendOutcome::Ignored);

        let m = store.get(id).unwrap();
        assert_eq!(m.text, "final");
        assert!(!m.streaming);
    }

    #[test]
    fn ids_are_unique() {
        let store = ConversationStore::new();
        let a = store.next_id();
        let b = store.next_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn subscribers_see_every_change() {
        let store = ConversationStore::new();
        let mut rx = store.subscribe();
        let id = store.next_id();

        store.append(Message::ai(id, "", "Streaming m", true));
        store.append(Message::ai(id, "a", "Streaming m", true));
        store.append(Message::ai(id, "a", "m", false));
        store.append(Message::ai(id, "a", "m", false));

        let mut seen = Vec::new();
        while let Ok(snap) = rx.try_recv() {
            assert_eq!(snap.len(), 1);
            seen.push(snap[0].streaming);
        }
        assert_eq!(seen, vec![true, true, false]);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let store = ConversationStore::new();
        let rx = store.subscribe();
        drop(rx);

        store.append(Message::user(store.next_id(), "hi"));
        assert!(store.lock().subscribers.is_empty());
    }
}
