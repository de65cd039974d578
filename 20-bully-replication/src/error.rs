//! Error types for peer calls and the client write path.

use std::time::Duration;

use thiserror::Error;

use crate::cluster::NodeId;

/// Failure of a single outbound peer call.
///
/// Callers never propagate these: a failed call is read as "peer absent" and turned
/// into an election, a skipped follower, or an unavailable-leader answer.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("peer rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Reasons a client write is refused.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("no leader available")]
    NoLeaderAvailable,

    #[error("not the leader (current leader: {leader:?})")]
    NotLeader { leader: Option<NodeId> },

    #[error("leader {leader} not reachable: {source}")]
    LeaderUnreachable {
        leader: NodeId,
        #[source]
        source: PeerError,
    },

    #[error("leader {leader} rejected forwarded write: {reason}")]
    ForwardRejected {
        leader: NodeId,
        status: u16,
        reason: String,
    },
}

impl NodeError {
    /// Classifies a failed forward to `leader`.
    pub fn from_forward(leader: NodeId, err: PeerError) -> Self {
        match err {
            PeerError::Rejected { status, reason } => NodeError::ForwardRejected {
                leader,
                status,
                reason,
            },
            source => NodeError::LeaderUnreachable { leader, source },
        }
    }
}
