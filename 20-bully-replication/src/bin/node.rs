//! Runs one node of the cluster.
//!
//! Start a 3-node cluster on one machine:
//! ```bash
//! # one terminal per node, ids 1..=3
//! cargo run --bin node -- --id 1 \
//!   --peers 127.0.0.1:8001:1,127.0.0.1:8002:2,127.0.0.1:8003:3
//! ```
//!
//! The same settings can come from `NODE_ID`, `OTHER_SERVERS` and `LISTEN_ADDR`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use bully_replication::config::Args;
use bully_replication::node::Node;
use bully_replication::peer::HttpPeerClient;
use bully_replication::server::Server;

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Args::parse().into_config()?;
    let client = HttpPeerClient::new(config.timing.rpc_timeout)
        .context("failed to build peer http client")?;
    let node = Arc::new(Node::new(
        config.cluster,
        Arc::new(client),
        config.timing,
        config.seed,
    ));

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    let server = Server::new(listener, Arc::clone(&node));
    info!(
        node = node.id(),
        addr = %server.local_addr()?,
        peers = node.cluster().peers().len(),
        "node listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let detector = node.spawn_failure_detector(async {
        let _ = stop_rx.await;
    });

    let result = server.run_until_ctrl_c().await;
    let _ = stop_tx.send(());
    if let Err(err) = detector.await {
        warn!(error = %err, "failure detector task ended abnormally");
    }
    result
}
