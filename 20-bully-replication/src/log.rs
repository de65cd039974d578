//! In-memory replicated message log.
//!
//! Every node keeps its own [`ReplicatedLog`]. The leader appends through
//! [`ReplicatedLog::append_as_leader`]; followers receive copies and insert them with
//! [`ReplicatedLog::append_as_follower`]. Either way the log is always ordered by
//! `(lamport_timestamp, node_id)`, which is the total order all nodes converge on.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::LamportClock;
use crate::cluster::NodeId;
use crate::message::{Message, MessageId};

/// Ordered, append-only message store.
///
/// One lock covers the whole read-modify-write of an append, so id assignment on the
/// leader never collides and the order view is never observed half-updated.
///
/// Arrival order is irrelevant: a message is inserted after every entry whose key is
/// less than or equal to its own, which is exactly where a stable re-sort would put
/// it. Duplicate ids are kept as-is; there is no idempotence check.
pub struct ReplicatedLog {
    clock: Arc<LamportClock>,
    inner: Mutex<LogInner>,
}

#[derive(Default)]
struct LogInner {
    messages: Vec<Message>,
    last_id: MessageId,
}

impl LogInner {
    fn insert_ordered(&mut self, message: Message) {
        let key = message.order_key();
        let position = self
            .messages
            .partition_point(|existing| existing.order_key() <= key);
        self.last_id = self.last_id.max(message.id);
        self.messages.insert(position, message);
    }
}

impl ReplicatedLog {
    /// Creates an empty log driven by `clock`.
    pub fn new(clock: Arc<LamportClock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(LogInner::default()),
        }
    }

    /// Creates a log holding the startup message `{id: 1, lamport: 0}` owned by
    /// `node_id`. A restarted process comes back to exactly this state.
    pub fn seeded(clock: Arc<LamportClock>, node_id: NodeId, content: impl Into<String>) -> Self {
        let log = Self::new(clock);
        log.inner
            .lock()
            .insert_ordered(Message::new(1, content, 0, node_id));
        log
    }

    /// Stamps and stores a new message as the leader.
    ///
    /// The id is the highest id seen plus one. This relies on a single writer: the
    /// caller must only invoke it while this node holds leadership.
    pub fn append_as_leader(&self, content: impl Into<String>, origin: NodeId) -> Message {
        let mut inner = self.inner.lock();
        let id = inner.last_id + 1;
        let lamport = self.clock.increment();
        let message = Message::new(id, content, lamport, origin);
        inner.insert_ordered(message.clone());
        message
    }

    /// Stores a message replicated from the leader.
    ///
    /// Observes the message's Lamport time first and returns the local time after
    /// the merge.
    pub fn append_as_follower(&self, message: Message) -> u64 {
        let mut inner = self.inner.lock();
        let local = self.clock.observe(message.lamport_timestamp);
        inner.insert_ordered(message);
        local
    }

    /// Returns every message in total order.
    ///
    /// Clones the log so callers never hold the lock while serializing.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    /// Looks a message up by id. With duplicates, the first in order wins.
    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.inner
            .lock()
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    pub fn last_id(&self) -> MessageId {
        self.inner.lock().last_id
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }
}
