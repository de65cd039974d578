//! JSON bodies exchanged between nodes and with clients.
//!
//! [`crate::message::Message`] itself travels unchanged on the replication route;
//! everything else is one of the small envelopes below.

use serde::{Deserialize, Serialize};

use crate::cluster::NodeId;
use crate::leadership::Role;
use crate::message::MessageId;

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub content: String,
    /// Set by a follower forwarding to the leader, so the write hops at most once.
    #[serde(default)]
    pub forwarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: MessageId,
}

/// Answer to `POST /message_received`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaAck {
    pub status: String,
    pub local_lamport: u64,
}

impl ReplicaAck {
    pub fn ok(local_lamport: u64) -> Self {
        Self {
            status: "ok".to_string(),
            local_lamport,
        }
    }
}

/// Body of `PUT /leader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderNotice {
    pub leader: NodeId,
}

/// Answer to `GET /lamport_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReading {
    pub time: u64,
    pub node_id: NodeId,
}

/// Answer to `GET /state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeState {
    pub node_id: NodeId,
    pub leader: Option<NodeId>,
    pub role: Role,
    pub lamport_time: u64,
    pub messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
