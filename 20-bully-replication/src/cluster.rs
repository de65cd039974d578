//! Static cluster membership: node ids, peer addresses and the bully ordering.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

/// Cluster-wide node identifier. Doubles as election priority: higher wins.
pub type NodeId = u64;

/// Address and identity of one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub host: String,
    pub port: u16,
    pub id: NodeId,
}

impl PeerDescriptor {
    pub fn new(host: impl Into<String>, port: u16, id: NodeId) -> Self {
        Self {
            host: host.into(),
            port,
            id,
        }
    }

    /// Base URL used by the HTTP peer client, e.g. `http://node1:80`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.id)
    }
}

/// Parses the `host:port:id` form used by `--peers` and `OTHER_SERVERS`.
impl FromStr for PeerDescriptor {
    type Err = anyhow::Error;

    fn from_str(entry: &str) -> Result<Self> {
        let entry = entry.trim();
        let mut parts = entry.rsplitn(3, ':');
        let (Some(id), Some(port), Some(host)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(anyhow!(
                "invalid peer entry '{entry}', expected host:port:id"
            ));
        };
        ensure!(!host.is_empty(), "empty host in peer entry '{entry}'");
        let port = port
            .parse()
            .with_context(|| format!("invalid port in peer entry '{entry}'"))?;
        let id = id
            .parse()
            .with_context(|| format!("invalid id in peer entry '{entry}'"))?;
        Ok(Self::new(host, port, id))
    }
}

/// Static membership as seen from one node.
///
/// Peers are kept sorted by id. The view never changes after startup.
#[derive(Debug, Clone)]
pub struct ClusterView {
    self_id: NodeId,
    peers: Vec<PeerDescriptor>,
}

impl ClusterView {
    pub fn new(self_id: NodeId, mut peers: Vec<PeerDescriptor>) -> Result<Self> {
        ensure!(!peers.is_empty(), "cluster requires at least one node");
        peers.sort_by_key(|peer| peer.id);
        if let Some(pair) = peers.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(anyhow!("duplicate node id {} in cluster", pair[0].id));
        }
        ensure!(
            peers.iter().any(|peer| peer.id == self_id),
            "self id {self_id} missing from cluster peers"
        );
        Ok(Self { self_id, peers })
    }

    /// Three local nodes on ports 8001-8003 with matching ids.
    pub fn demo(self_id: NodeId) -> Result<Self> {
        let peers = (1..=3)
            .map(|id| PeerDescriptor::new("127.0.0.1", 8000 + id as u16, id))
            .collect();
        Self::new(self_id, peers)
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn peers(&self) -> &[PeerDescriptor] {
        &self.peers
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.iter().map(|peer| peer.id)
    }

    pub fn peer(&self, id: NodeId) -> Option<&PeerDescriptor> {
        self.peers.iter().find(|peer| peer.id == id)
    }

    pub fn local(&self) -> &PeerDescriptor {
        self.peer(self.self_id)
            .expect("self id is validated at construction")
    }

    /// Every member except this node.
    pub fn others(&self) -> impl Iterator<Item = &PeerDescriptor> + '_ {
        self.peers.iter().filter(move |peer| peer.id != self.self_id)
    }

    /// Members that out-rank this node, highest first.
    pub fn higher(&self) -> impl Iterator<Item = &PeerDescriptor> + '_ {
        self.peers
            .iter()
            .rev()
            .filter(move |peer| peer.id > self.self_id)
    }

    pub fn is_highest(&self) -> bool {
        self.higher().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(ids: &[NodeId]) -> Vec<PeerDescriptor> {
        ids.iter()
            .map(|&id| PeerDescriptor::new("localhost", 9000 + id as u16, id))
            .collect()
    }

    #[test]
    fn parses_host_port_id() {
        let peer: PeerDescriptor = "34.55.87.209:80:8001".parse().unwrap();
        assert_eq!(peer, PeerDescriptor::new("34.55.87.209", 80, 8001));
        assert_eq!(peer.base_url(), "http://34.55.87.209:80");
        assert_eq!(peer.to_string(), "34.55.87.209:80:8001");
    }

    #[test]
    fn parse_trims_whitespace() {
        let peer: PeerDescriptor = " node2:80:8002 ".parse().unwrap();
        assert_eq!(peer.host, "node2");
        assert_eq!(peer.id, 8002);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("node1:80".parse::<PeerDescriptor>().is_err());
        assert!("node1:eighty:1".parse::<PeerDescriptor>().is_err());
        assert!("node1:80:one".parse::<PeerDescriptor>().is_err());
        assert!(":80:1".parse::<PeerDescriptor>().is_err());
        assert!("".parse::<PeerDescriptor>().is_err());
    }

    #[test]
    fn view_sorts_and_validates() {
        let view = ClusterView::new(2, peers(&[3, 1, 2])).unwrap();
        assert_eq!(view.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(view.local().id, 2);
        assert_eq!(view.others().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn view_rejects_duplicates_and_missing_self() {
        assert!(ClusterView::new(1, peers(&[1, 2, 2])).is_err());
        assert!(ClusterView::new(4, peers(&[1, 2, 3])).is_err());
        assert!(ClusterView::new(1, Vec::new()).is_err());
    }

    #[test]
    fn higher_lists_only_outranking_peers_descending() {
        let view = ClusterView::new(2, peers(&[1, 2, 3, 5])).unwrap();
        assert_eq!(view.higher().map(|p| p.id).collect::<Vec<_>>(), vec![5, 3]);
        assert!(!view.is_highest());

        let top = ClusterView::new(5, peers(&[1, 2, 3, 5])).unwrap();
        assert!(top.is_highest());
    }

    #[test]
    fn demo_has_three_local_nodes() {
        let view = ClusterView::demo(1).unwrap();
        assert_eq!(view.peers().len(), 3);
        assert_eq!(view.peer(3).unwrap().port, 8003);
    }
}
