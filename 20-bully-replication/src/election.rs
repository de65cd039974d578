//! Bully leader election.
//!
//! Only peers with a higher id can out-rank this node, so an election only ever
//! talks to them:
//!
//! 1. Ask every higher peer who it thinks the leader is.
//! 2. If one names a leader, adopt it and tell everybody.
//! 3. If none answers at all, this node is the highest live member: promote self and
//!    tell everybody.
//! 4. If a higher peer answers but knows no leader, it is alive and out-ranks us. Ask
//!    it to take over, back off, and look again. The loop is capped; when it runs
//!    out the node is left without a leader and the failure detector tries again on
//!    its next tick.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterView, NodeId, PeerDescriptor};
use crate::leadership::LeadershipState;
use crate::peer::PeerRpc;

/// How an election pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// No higher peer answered; this node is now leader.
    ElectedSelf,
    /// Another node's leadership was adopted.
    Adopted(NodeId),
    /// Higher peers were alive but no leader emerged within the attempt cap.
    Exhausted,
}

pub struct LeaderElector {
    cluster: ClusterView,
    leadership: Arc<LeadershipState>,
    peers: PeerRpc,
    backoff: Duration,
    max_attempts: u32,
    // Serializes elections on this node.
    running: Mutex<()>,
}

impl LeaderElector {
    pub fn new(
        cluster: ClusterView,
        leadership: Arc<LeadershipState>,
        peers: PeerRpc,
        backoff: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            cluster,
            leadership,
            peers,
            backoff,
            max_attempts: max_attempts.max(1),
            running: Mutex::new(()),
        }
    }

    pub fn cluster(&self) -> &ClusterView {
        &self.cluster
    }

    pub fn leadership(&self) -> &Arc<LeadershipState> {
        &self.leadership
    }

    pub fn peers(&self) -> &PeerRpc {
        &self.peers
    }

    /// Runs one bounded election and returns its outcome.
    ///
    /// A concurrent call waits for the running election. If that election settled a
    /// leader, the waiter returns it without clearing anything; a leader trusts itself.
    pub async fn run_election(&self) -> ElectionOutcome {
        let me = self.cluster.self_id();
        let before = self.leadership.current();
        let _running = self.running.lock().await;
        match self.leadership.current() {
            Some(leader) if leader == me => {
                debug!(node = me, "already leading, skipping election");
                return ElectionOutcome::ElectedSelf;
            }
            Some(leader) if Some(leader) != before => {
                debug!(node = me, leader, "leader settled while waiting, skipping election");
                return ElectionOutcome::Adopted(leader);
            }
            _ => {}
        }

        let _electing = Electing::begin(&self.leadership);
        let previous = self.leadership.set(None);
        info!(node = me, ?previous, "starting election");

        for attempt in 1..=self.max_attempts {
            let mut leaderless = None;
            for (peer, answer) in self.probe_higher().await {
                match answer {
                    Some(leader) => {
                        self.adopt(leader).await;
                        return ElectionOutcome::Adopted(leader);
                    }
                    None if leaderless.is_none() => leaderless = Some(peer),
                    None => {}
                }
            }

            let Some(candidate) = leaderless else {
                self.promote_self().await;
                return ElectionOutcome::ElectedSelf;
            };

            debug!(
                node = me,
                attempt,
                peer = candidate.id,
                "higher peer alive without leader, asking it to take over"
            );
            if let Err(err) = self.peers.request_election(candidate).await {
                debug!(node = me, peer = candidate.id, error = %err, "take-over request failed");
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }

            // A notification may have landed while we waited.
            if let Some(leader) = self.leadership.current() {
                info!(node = me, leader, "leader announced during election");
                return ElectionOutcome::Adopted(leader);
            }
        }

        warn!(node = me, attempts = self.max_attempts, "election gave up without a leader");
        ElectionOutcome::Exhausted
    }

    /// Records a leader announced by another node. No staleness check.
    pub fn accept_notice(&self, leader: NodeId) {
        let previous = self.leadership.set(Some(leader));
        if previous != Some(leader) {
            info!(node = self.cluster.self_id(), ?previous, leader, "leader announced");
        }
    }

    /// Tells every other member that `leader` leads. Failures are ignored.
    pub async fn announce(&self, leader: NodeId) {
        let calls = self.cluster.others().map(|peer| async move {
            if let Err(err) = self.peers.notify_leader(peer, leader).await {
                debug!(peer = peer.id, leader, error = %err, "leader notification not delivered");
            }
        });
        join_all(calls).await;
    }

    /// Queries all higher peers concurrently.
    ///
    /// Returns only the peers that answered, highest id first, with the leader each
    /// one reported.
    async fn probe_higher(&self) -> Vec<(&PeerDescriptor, Option<NodeId>)> {
        let probes = self.cluster.higher().map(|peer| async move {
            let answer = self.peers.query_leader(peer).await;
            (peer, answer)
        });
        join_all(probes)
            .await
            .into_iter()
            .filter_map(|(peer, answer)| match answer {
                Ok(leader) => Some((peer, leader)),
                Err(err) => {
                    debug!(peer = peer.id, error = %err, "higher peer did not answer");
                    None
                }
            })
            .collect()
    }

    async fn adopt(&self, leader: NodeId) {
        self.leadership.set(Some(leader));
        info!(node = self.cluster.self_id(), leader, "adopted leader from higher peer");
        self.announce(leader).await;
    }

    async fn promote_self(&self) {
        let me = self.cluster.self_id();
        self.leadership.set(Some(me));
        info!(node = me, "no higher peer answered, taking leadership");
        self.announce(me).await;
    }
}

/// Holds the `Electing` role; clears it on drop, including when the election future
/// is cancelled.
struct Electing<'a>(&'a LeadershipState);

impl<'a> Electing<'a> {
    fn begin(state: &'a LeadershipState) -> Self {
        state.set_electing(true);
        Self(state)
    }
}

impl Drop for Electing<'_> {
    fn drop(&mut self) {
        self.0.set_electing(false);
    }
}
