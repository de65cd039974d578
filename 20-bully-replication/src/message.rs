//! Log entries and their total order.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cluster::NodeId;

pub type MessageId = u64;

/// A client write, stamped by whichever node was leader when it was accepted.
///
/// Immutable once created. Field names match the JSON exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub lamport_timestamp: u64,
    /// Node that created the message.
    pub node_id: NodeId,
    /// Wall-clock seconds since the epoch. Diagnostic only, never used for ordering.
    pub physical_timestamp: f64,
}

impl Message {
    pub fn new(
        id: MessageId,
        content: impl Into<String>,
        lamport_timestamp: u64,
        node_id: NodeId,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            lamport_timestamp,
            node_id,
            physical_timestamp: unix_seconds(),
        }
    }

    /// Total-order key: Lamport time, ties broken by origin node.
    pub fn order_key(&self) -> (u64, NodeId) {
        (self.lamport_timestamp, self.node_id)
    }

    pub fn cmp_order(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
