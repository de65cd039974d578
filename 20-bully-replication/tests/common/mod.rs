//! Shared harness for the integration suites.
//!
//! [`LocalNetwork`] is an in-process [`PeerClient`]: calls go straight to the target
//! [`Node`] instead of over HTTP, and each node's link can be cut or made to hang.
//! [`TestCluster`] wires N nodes to one network and offers polling helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use bully_replication::cluster::{ClusterView, NodeId, PeerDescriptor};
use bully_replication::config::Timing;
use bully_replication::error::{NodeError, PeerError};
use bully_replication::message::{Message, MessageId};
use bully_replication::node::Node;
use bully_replication::peer::PeerClient;
use bully_replication::protocol::ReplicaAck;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Up,
    /// Calls fail at once, like a refused connection.
    Down,
    /// Calls never answer; only the caller's timeout ends them.
    Hang,
}

#[derive(Default)]
pub struct LocalNetwork {
    nodes: Mutex<HashMap<NodeId, Weak<Node>>>,
    links: Mutex<HashMap<NodeId, Link>>,
}

impl LocalNetwork {
    pub fn register(&self, node: &Arc<Node>) {
        self.nodes.lock().insert(node.id(), Arc::downgrade(node));
        self.links.lock().insert(node.id(), Link::Up);
    }

    pub fn set_link(&self, id: NodeId, link: Link) {
        self.links.lock().insert(id, link);
    }

    async fn reach(&self, peer: &PeerDescriptor) -> Result<Arc<Node>, PeerError> {
        let link = self
            .links
            .lock()
            .get(&peer.id)
            .copied()
            .unwrap_or(Link::Down);
        match link {
            Link::Up => {}
            Link::Down => return Err(PeerError::Transport(format!("node {} is down", peer.id))),
            Link::Hang => std::future::pending::<()>().await,
        }
        self.nodes
            .lock()
            .get(&peer.id)
            .and_then(Weak::upgrade)
            .ok_or_else(|| PeerError::Transport(format!("node {} is gone", peer.id)))
    }
}

#[async_trait]
impl PeerClient for LocalNetwork {
    async fn query_leader(&self, peer: &PeerDescriptor) -> Result<Option<NodeId>, PeerError> {
        Ok(self.reach(peer).await?.query_leader())
    }

    async fn notify_leader(&self, peer: &PeerDescriptor, leader: NodeId) -> Result<(), PeerError> {
        self.reach(peer).await?.notify_leader(leader);
        Ok(())
    }

    async fn request_election(&self, peer: &PeerDescriptor) -> Result<(), PeerError> {
        drop(self.reach(peer).await?.handle_election_request());
        Ok(())
    }

    async fn replicate(
        &self,
        peer: &PeerDescriptor,
        message: &Message,
    ) -> Result<ReplicaAck, PeerError> {
        Ok(self.reach(peer).await?.receive_replica(message.clone()))
    }

    async fn forward_write(
        &self,
        peer: &PeerDescriptor,
        content: &str,
    ) -> Result<MessageId, PeerError> {
        let node = self.reach(peer).await?;
        node.submit_write(content.to_string(), true)
            .await
            .map_err(|err| PeerError::Rejected {
                status: status_for(&err),
                reason: err.to_string(),
            })
    }
}

/// Same codes the HTTP router answers with.
fn status_for(err: &NodeError) -> u16 {
    match err {
        NodeError::NoLeaderAvailable => 503,
        NodeError::NotLeader { .. } => 409,
        NodeError::LeaderUnreachable { .. } => 502,
        NodeError::ForwardRejected { status, .. } => *status,
    }
}

/// Short intervals so elections and failover finish well inside test timeouts.
pub fn fast_timing() -> Timing {
    Timing {
        poll_interval: Duration::from_millis(50),
        rpc_timeout: Duration::from_millis(100),
        election_backoff: Duration::from_millis(20),
        election_attempts: 8,
    }
}

struct Detector {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// N in-process nodes with ids `1..=n` sharing one [`LocalNetwork`].
pub struct TestCluster {
    pub network: Arc<LocalNetwork>,
    nodes: Vec<Arc<Node>>,
    detectors: HashMap<NodeId, Detector>,
}

impl TestCluster {
    /// Builds the cluster without starting any failure detector.
    pub fn new(n: u64, timing: Timing) -> Result<Self> {
        let network = Arc::new(LocalNetwork::default());
        let peers: Vec<PeerDescriptor> = (1..=n)
            .map(|id| PeerDescriptor::new(format!("node{id}"), 80, id))
            .collect();

        let mut nodes = Vec::new();
        for id in 1..=n {
            let cluster = ClusterView::new(id, peers.clone())?;
            let node = Arc::new(Node::new(
                cluster,
                network.clone(),
                timing,
                Some("Hello".to_string()),
            ));
            network.register(&node);
            nodes.push(node);
        }

        Ok(Self {
            network,
            nodes,
            detectors: HashMap::new(),
        })
    }

    /// Gets a node by its 1-based id.
    pub fn node(&self, id: NodeId) -> &Arc<Node> {
        &self.nodes[(id - 1) as usize]
    }

    pub fn start_detectors(&mut self) {
        for id in 1..=self.nodes.len() as NodeId {
            self.start_detector(id);
        }
    }

    pub fn start_detector(&mut self, id: NodeId) {
        let (stop, stop_rx) = oneshot::channel();
        let task = self.node(id).spawn_failure_detector(async {
            let _ = stop_rx.await;
        });
        self.detectors.insert(id, Detector { stop, task });
    }

    /// Takes a node off the network and stops its failure detector.
    pub async fn kill(&mut self, id: NodeId) {
        self.network.set_link(id, Link::Down);
        self.stop_detector(id).await;
    }

    pub fn is_up(&self, id: NodeId) -> bool {
        self.network.links.lock().get(&id) == Some(&Link::Up)
    }

    async fn stop_detector(&mut self, id: NodeId) {
        if let Some(detector) = self.detectors.remove(&id) {
            let _ = detector.stop.send(());
            let _ = detector.task.await;
        }
    }

    /// Waits for a specific node to consider itself leader.
    pub async fn wait_for_node_to_become_leader(
        &self,
        id: NodeId,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.node(id).leadership().is_leader() {
                return Ok(());
            }
            if start.elapsed() > timeout {
                bail!("timeout waiting for node {id} to become leader");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Waits for every live node to name `expected` as leader.
    pub async fn wait_for_leader_consensus(
        &self,
        expected: NodeId,
        timeout: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            let all_agree = self
                .nodes
                .iter()
                .filter(|node| self.is_up(node.id()))
                .all(|node| node.query_leader() == Some(expected));
            if all_agree {
                return Ok(());
            }
            if start.elapsed() > timeout {
                let views: Vec<_> = self
                    .nodes
                    .iter()
                    .map(|node| (node.id(), node.query_leader()))
                    .collect();
                bail!("timeout waiting for consensus on leader {expected}, views: {views:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Elects the highest node directly and waits until everyone follows it.
    pub async fn elect_highest(&self) -> Result<NodeId> {
        let highest = self.nodes.len() as NodeId;
        self.node(highest).elector().run_election().await;
        self.wait_for_leader_consensus(highest, Duration::from_secs(2)).await?;
        Ok(highest)
    }

    pub async fn shutdown(mut self) {
        let ids: Vec<NodeId> = self.detectors.keys().copied().collect();
        for id in ids {
            self.stop_detector(id).await;
        }
    }
}
