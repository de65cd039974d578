//! Background leader liveness check.
//!
//! The detector is the only thing that starts elections on its own. It runs for the
//! lifetime of the node, independent of request handling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cluster::NodeId;
use crate::election::{ElectionOutcome, LeaderElector};

/// What a single detector tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// This node leads; nothing to check.
    SelfIsLeader,
    /// The leader answered and agrees with our view.
    Healthy,
    /// The leader reported a different leader, which we took over without voting.
    Adopted(NodeId),
    /// No usable leader; an election ran.
    ElectionTriggered(ElectionOutcome),
}

pub struct FailureDetector {
    elector: Arc<LeaderElector>,
    interval: Duration,
}

impl FailureDetector {
    pub fn new(elector: Arc<LeaderElector>, interval: Duration) -> Self {
        Self { elector, interval }
    }

    /// Runs one check of the current leader.
    pub async fn tick(&self) -> ProbeOutcome {
        let leadership = self.elector.leadership();
        let me = leadership.self_id();
        let Some(leader) = leadership.current() else {
            info!(node = me, "no leader known, starting election");
            return ProbeOutcome::ElectionTriggered(self.elector.run_election().await);
        };
        if leader == me {
            return ProbeOutcome::SelfIsLeader;
        }

        let Some(peer) = self.elector.cluster().peer(leader) else {
            warn!(node = me, leader, "leader is not a cluster member, starting election");
            return ProbeOutcome::ElectionTriggered(self.elector.run_election().await);
        };

        match self.elector.peers().query_leader(peer).await {
            Ok(Some(reported)) if reported == leader => {
                debug!(node = me, leader, "leader healthy");
                ProbeOutcome::Healthy
            }
            Ok(Some(reported)) => {
                info!(
                    node = me,
                    previous = leader,
                    leader = reported,
                    "leader reports a different leader, adopting it"
                );
                leadership.set(Some(reported));
                ProbeOutcome::Adopted(reported)
            }
            Ok(None) => {
                info!(node = me, leader, "leader knows no leader, starting election");
                ProbeOutcome::ElectionTriggered(self.elector.run_election().await)
            }
            Err(err) => {
                warn!(node = me, leader, error = %err, "leader not responding, starting election");
                ProbeOutcome::ElectionTriggered(self.elector.run_election().await)
            }
        }
    }

    /// Ticks every interval until `shutdown` resolves. The first tick fires at once,
    /// which doubles as the startup election.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = &mut shutdown => {
                    debug!("failure detector stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "failure detector tick");
                }
            }
        }
    }
}
