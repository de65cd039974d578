//! The node facade.
//!
//! [`Node`] owns every piece of per-node state (leadership, clock, log) and the
//! elector, and exposes the operations the HTTP layer serves. Handlers never touch
//! the pieces directly.
//!
//! # Write path
//!
//! - **Leader**: stamps the message with the next id and Lamport time, stores it, then
//!   pushes it to every follower. Followers that miss the push are skipped; the write
//!   still succeeds.
//! - **Follower**: forwards the content once to the leader it knows about and returns
//!   the id the leader assigned. The forwarded request is flagged, and a flagged write
//!   that lands on a non-leader is refused instead of hopping again.
//! - **No leader**: the write fails immediately. Nothing waits for an election.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::LamportClock;
use crate::cluster::{ClusterView, NodeId};
use crate::config::Timing;
use crate::detector::FailureDetector;
use crate::election::LeaderElector;
use crate::error::NodeError;
use crate::leadership::LeadershipState;
use crate::log::ReplicatedLog;
use crate::message::{Message, MessageId};
use crate::peer::{PeerClient, PeerRpc};
use crate::protocol::{ClockReading, NodeState, ReplicaAck};

/// Result of one replication fan-out, kept for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    pub acked: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

pub struct Node {
    leadership: Arc<LeadershipState>,
    log: ReplicatedLog,
    elector: Arc<LeaderElector>,
    poll_interval: Duration,
}

impl Node {
    /// Builds a node from its membership view and a transport.
    ///
    /// `seed`, when present, becomes message 1 with Lamport time 0, so every node
    /// starts with the same first entry.
    pub fn new(
        cluster: ClusterView,
        client: Arc<dyn PeerClient>,
        timing: Timing,
        seed: Option<String>,
    ) -> Self {
        let self_id = cluster.self_id();
        let clock = Arc::new(LamportClock::new());
        let log = match seed {
            Some(content) => ReplicatedLog::seeded(clock, self_id, content),
            None => ReplicatedLog::new(clock),
        };
        let leadership = Arc::new(LeadershipState::new(self_id));
        let peers = PeerRpc::new(client, timing.rpc_timeout);
        let elector = Arc::new(LeaderElector::new(
            cluster,
            Arc::clone(&leadership),
            peers,
            timing.election_backoff,
            timing.election_attempts,
        ));
        Self {
            leadership,
            log,
            elector,
            poll_interval: timing.poll_interval,
        }
    }

    pub fn id(&self) -> NodeId {
        self.leadership.self_id()
    }

    pub fn cluster(&self) -> &ClusterView {
        self.elector.cluster()
    }

    pub fn leadership(&self) -> &LeadershipState {
        &self.leadership
    }

    pub fn elector(&self) -> &Arc<LeaderElector> {
        &self.elector
    }

    pub fn log(&self) -> &ReplicatedLog {
        &self.log
    }

    /// Accepts a client write and returns the id the leader assigned to it.
    ///
    /// `forwarded` marks a write that already took its one hop from a follower.
    pub async fn submit_write(
        &self,
        content: String,
        forwarded: bool,
    ) -> Result<MessageId, NodeError> {
        let me = self.id();
        let stamped = self
            .leadership
            .while_leading(|| self.log.append_as_leader(content.as_str(), me));

        if let Some(message) = stamped {
            info!(
                node = me,
                id = message.id,
                lamport = message.lamport_timestamp,
                forwarded,
                "write stamped"
            );
            let report = self.replicate(&message).await;
            debug!(
                id = message.id,
                acked = ?report.acked,
                failed = ?report.failed,
                "fan-out done"
            );
            return Ok(message.id);
        }

        // Leadership gained after the check above still counts as not leading here.
        let leader = self.leadership.current().filter(|&id| id != me);

        if forwarded {
            debug!(node = me, ?leader, "refusing forwarded write as non-leader");
            return Err(NodeError::NotLeader { leader });
        }

        let Some(leader) = leader else {
            return Err(NodeError::NoLeaderAvailable);
        };
        let Some(peer) = self.cluster().peer(leader) else {
            warn!(node = me, leader, "known leader is not a cluster member");
            return Err(NodeError::NoLeaderAvailable);
        };

        debug!(node = me, leader, "forwarding write to leader");
        self.elector
            .peers()
            .forward_write(peer, &content)
            .await
            .map_err(|err| {
                warn!(node = me, leader, error = %err, "forward to leader failed");
                NodeError::from_forward(leader, err)
            })
    }

    /// Pushes `message` to every other member at once. Best effort: failures are
    /// logged and reported, never retried.
    pub async fn replicate(&self, message: &Message) -> ReplicationReport {
        let peers = self.elector.peers();
        let pushes = self.cluster().others().map(|peer| async move {
            let result = peers.replicate(peer, message).await;
            (peer.id, result)
        });

        let mut report = ReplicationReport::default();
        for (peer, result) in join_all(pushes).await {
            match result {
                Ok(ack) => {
                    debug!(peer, id = message.id, lamport = ack.local_lamport, "replica acked");
                    report.acked.push(peer);
                }
                Err(err) => {
                    warn!(peer, id = message.id, error = %err, "replication failed");
                    report.failed.push(peer);
                }
            }
        }
        report
    }

    /// Stores a message pushed by the leader.
    pub fn receive_replica(&self, message: Message) -> ReplicaAck {
        let id = message.id;
        let origin = message.node_id;
        let local = self.log.append_as_follower(message);
        debug!(node = self.id(), id, origin, lamport = local, "replica stored");
        ReplicaAck::ok(local)
    }

    pub fn query_leader(&self) -> Option<NodeId> {
        self.leadership.current()
    }

    pub fn notify_leader(&self, leader: NodeId) {
        self.elector.accept_notice(leader);
    }

    /// Answers a lower peer asking this node to take over.
    ///
    /// A leader simply repeats its announcement. Anyone else starts an election in
    /// the background so the caller is not held for its duration.
    pub fn handle_election_request(&self) -> JoinHandle<()> {
        let elector = Arc::clone(&self.elector);
        let me = self.id();
        if self.leadership.is_leader() {
            debug!(node = me, "election requested while leading, re-announcing");
            return tokio::spawn(async move { elector.announce(me).await });
        }
        info!(node = me, "election requested by lower peer");
        tokio::spawn(async move {
            let outcome = elector.run_election().await;
            debug!(node = me, ?outcome, "requested election finished");
        })
    }

    pub fn clock_time(&self) -> ClockReading {
        ClockReading {
            time: self.log.clock().read(),
            node_id: self.id(),
        }
    }

    pub fn list_messages(&self) -> Vec<Message> {
        self.log.snapshot()
    }

    pub fn get_message(&self, id: MessageId) -> Option<Message> {
        self.log.get(id)
    }

    pub fn state(&self) -> NodeState {
        NodeState {
            node_id: self.id(),
            leader: self.leadership.current(),
            role: self.leadership.role(),
            lamport_time: self.log.clock().read(),
            messages: self.log.len(),
        }
    }

    /// Starts the failure detector on its own task. It stops when `shutdown` resolves.
    pub fn spawn_failure_detector<F>(&self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let detector = FailureDetector::new(Arc::clone(&self.elector), self.poll_interval);
        tokio::spawn(detector.run_until(shutdown))
    }
}
