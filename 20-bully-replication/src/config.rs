//! Startup configuration: command-line flags with environment fallbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};

use crate::cluster::{ClusterView, NodeId, PeerDescriptor};

/// Intervals and limits that drive the background loops and peer calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Time between failure-detector ticks.
    pub poll_interval: Duration,
    /// Hard deadline on every outbound peer call.
    pub rpc_timeout: Duration,
    /// Pause between election attempts while a higher peer has no leader.
    pub election_backoff: Duration,
    pub election_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(2),
            election_backoff: Duration::from_millis(500),
            election_attempts: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub cluster: ClusterView,
    pub listen: SocketAddr,
    pub timing: Timing,
    /// Content of the message every log starts with, if any.
    pub seed: Option<String>,
}

/// Command-line arguments for a node.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run one node of a bully-elected replicated message log")]
pub struct Args {
    /// This node's id (must appear in --peers)
    #[arg(long, env = "NODE_ID")]
    pub id: NodeId,

    /// Address to serve HTTP on; defaults to 0.0.0.0 and this node's port in --peers
    #[arg(long, env = "LISTEN_ADDR", value_hint = ValueHint::Hostname)]
    pub listen: Option<SocketAddr>,

    /// Comma-separated cluster members as host:port:id (must include self).
    /// Defaults to three local nodes on ports 8001-8003.
    #[arg(long, env = "OTHER_SERVERS", value_delimiter = ',', value_hint = ValueHint::Other)]
    pub peers: Vec<PeerDescriptor>,

    #[arg(long, default_value_t = 5000)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = 2000)]
    pub rpc_timeout_ms: u64,

    #[arg(long, default_value_t = 500)]
    pub election_backoff_ms: u64,

    #[arg(long, default_value_t = 8)]
    pub election_attempts: u32,

    /// Content of the initial log entry
    #[arg(long, default_value = "Hello")]
    pub seed: String,

    /// Start with an empty log
    #[arg(long, conflicts_with = "seed")]
    pub no_seed: bool,
}

impl Args {
    pub fn into_config(self) -> Result<NodeConfig> {
        let cluster = if self.peers.is_empty() {
            ClusterView::demo(self.id)
        } else {
            ClusterView::new(self.id, self.peers)
        }
        .context("invalid cluster membership")?;

        let listen = self.listen.unwrap_or_else(|| {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), cluster.local().port)
        });

        Ok(NodeConfig {
            cluster,
            listen,
            timing: Timing {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
                election_backoff: Duration::from_millis(self.election_backoff_ms),
                election_attempts: self.election_attempts.max(1),
            },
            seed: (!self.no_seed).then_some(self.seed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<NodeConfig> {
        let args = Args::try_parse_from(std::iter::once("node").chain(args.iter().copied()))?;
        args.into_config()
    }

    #[test]
    fn defaults_match_timing_default() {
        let config = parse(&["--id", "2"]).unwrap();
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.seed.as_deref(), Some("Hello"));
        assert_eq!(config.cluster.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(config.listen, "0.0.0.0:8002".parse().unwrap());
    }

    #[test]
    fn peers_parse_from_comma_list() {
        let config = parse(&[
            "--id",
            "8002",
            "--peers",
            "node1:80:8001,node2:80:8002,node3:80:8003",
            "--listen",
            "127.0.0.1:9000",
            "--no-seed",
        ])
        .unwrap();
        assert_eq!(config.cluster.local(), &PeerDescriptor::new("node2", 80, 8002));
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert!(config.seed.is_none());
    }

    #[test]
    fn malformed_peer_entry_is_rejected() {
        assert!(parse(&["--id", "1", "--peers", "node1:80"]).is_err());
        assert!(parse(&["--id", "1", "--peers", "node1:x:1"]).is_err());
    }

    #[test]
    fn duplicate_ids_and_missing_self_are_rejected() {
        assert!(parse(&["--id", "1", "--peers", "a:1:1,b:2:1"]).is_err());
        assert!(parse(&["--id", "4", "--peers", "a:1:1,b:2:2"]).is_err());
    }

    #[test]
    fn attempts_never_drop_below_one() {
        let config = parse(&["--id", "1", "--election-attempts", "0"]).unwrap();
        assert_eq!(config.timing.election_attempts, 1);
    }
}
