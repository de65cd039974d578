//! Bully-elected replicated message log.
//!
//! A fixed set of nodes elects a coordinator with the bully algorithm: the highest
//! live id wins. The coordinator stamps every client message with the next id and a
//! Lamport timestamp and pushes it to the followers, which keep their copy ordered by
//! `(lamport_timestamp, node_id)`.
//!
//! # Architecture
//!
//! - **Request handling**: an axum router ([`server`]) over a shared [`node::Node`].
//! - **Failure detector**: one background task ([`detector`]) that polls the leader
//!   and starts elections.
//! - **Peer calls**: everything outbound goes through [`peer::PeerRpc`], which bounds
//!   each call with a timeout. Tests swap the HTTP transport for an in-process one.
//!
//! # Modules
//!
//! - [`clock`]: Lamport logical clock
//! - [`cluster`]: static membership and peer addresses
//! - [`leadership`]: the node's view of who leads
//! - [`election`]: bully election
//! - [`detector`]: periodic leader liveness check
//! - [`log`]: ordered message store
//! - [`node`]: write routing, replication and queries
//! - [`peer`]: outbound RPC seam and its HTTP implementation
//! - [`protocol`]: JSON bodies
//! - [`server`]: HTTP routes
//! - [`config`]: command line and timing

pub mod clock;
pub mod cluster;
pub mod config;
pub mod detector;
pub mod election;
pub mod error;
pub mod leadership;
pub mod log;
pub mod message;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod server;
