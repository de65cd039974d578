//! Outbound peer RPCs.
//!
//! The core never talks to the network directly. It goes through a [`PeerClient`],
//! wrapped in [`PeerRpc`] so that every call races the configured timeout no matter
//! which transport sits underneath. A timeout and a refused connection look the
//! same to callers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::cluster::{NodeId, PeerDescriptor};
use crate::error::PeerError;
use crate::message::{Message, MessageId};
use crate::protocol::{ErrorBody, LeaderNotice, ReplicaAck, WriteRequest, WriteResponse};

/// The RPCs one node issues to another.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Asks `peer` who it believes the leader is.
    async fn query_leader(&self, peer: &PeerDescriptor) -> Result<Option<NodeId>, PeerError>;

    /// Tells `peer` to record `leader` as the current leader.
    async fn notify_leader(&self, peer: &PeerDescriptor, leader: NodeId) -> Result<(), PeerError>;

    /// Asks a higher-ranked `peer` to run its own election.
    async fn request_election(&self, peer: &PeerDescriptor) -> Result<(), PeerError>;

    /// Pushes a leader-stamped message to a follower.
    async fn replicate(
        &self,
        peer: &PeerDescriptor,
        message: &Message,
    ) -> Result<ReplicaAck, PeerError>;

    /// Hands a client write to the leader. The leader must not forward it again.
    async fn forward_write(
        &self,
        peer: &PeerDescriptor,
        content: &str,
    ) -> Result<MessageId, PeerError>;
}

/// A [`PeerClient`] bound to a hard per-call deadline.
#[derive(Clone)]
pub struct PeerRpc {
    client: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl PeerRpc {
    pub fn new(client: Arc<dyn PeerClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn query_leader(&self, peer: &PeerDescriptor) -> Result<Option<NodeId>, PeerError> {
        self.bounded(self.client.query_leader(peer)).await
    }

    pub async fn notify_leader(
        &self,
        peer: &PeerDescriptor,
        leader: NodeId,
    ) -> Result<(), PeerError> {
        self.bounded(self.client.notify_leader(peer, leader)).await
    }

    pub async fn request_election(&self, peer: &PeerDescriptor) -> Result<(), PeerError> {
        self.bounded(self.client.request_election(peer)).await
    }

    pub async fn replicate(
        &self,
        peer: &PeerDescriptor,
        message: &Message,
    ) -> Result<ReplicaAck, PeerError> {
        self.bounded(self.client.replicate(peer, message)).await
    }

    pub async fn forward_write(
        &self,
        peer: &PeerDescriptor,
        content: &str,
    ) -> Result<MessageId, PeerError> {
        self.bounded(self.client.forward_write(peer, content)).await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, PeerError>
    where
        F: Future<Output = Result<T, PeerError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PeerError::Timeout(self.timeout)),
        }
    }
}

/// JSON-over-HTTP transport matching the routes in [`crate::server`].
#[derive(Clone)]
pub struct HttpPeerClient {
    http: Client,
}

impl HttpPeerClient {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|err| PeerError::Transport(err.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn query_leader(&self, peer: &PeerDescriptor) -> Result<Option<NodeId>, PeerError> {
        let response = self
            .http
            .get(format!("{}/leader", peer.base_url()))
            .send()
            .await
            .map_err(transport_error)?;
        decode(accept(response).await?).await
    }

    async fn notify_leader(&self, peer: &PeerDescriptor, leader: NodeId) -> Result<(), PeerError> {
        let response = self
            .http
            .put(format!("{}/leader", peer.base_url()))
            .json(&LeaderNotice { leader })
            .send()
            .await
            .map_err(transport_error)?;
        accept(response).await.map(|_| ())
    }

    async fn request_election(&self, peer: &PeerDescriptor) -> Result<(), PeerError> {
        let response = self
            .http
            .post(format!("{}/election", peer.base_url()))
            .send()
            .await
            .map_err(transport_error)?;
        accept(response).await.map(|_| ())
    }

    async fn replicate(
        &self,
        peer: &PeerDescriptor,
        message: &Message,
    ) -> Result<ReplicaAck, PeerError> {
        let response = self
            .http
            .post(format!("{}/message_received", peer.base_url()))
            .json(message)
            .send()
            .await
            .map_err(transport_error)?;
        decode(accept(response).await?).await
    }

    async fn forward_write(
        &self,
        peer: &PeerDescriptor,
        content: &str,
    ) -> Result<MessageId, PeerError> {
        let request = WriteRequest {
            content: content.to_string(),
            forwarded: true,
        };
        let response = self
            .http
            .post(format!("{}/messages", peer.base_url()))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let body: WriteResponse = decode(accept(response).await?).await?;
        Ok(body.id)
    }
}

fn transport_error(err: reqwest::Error) -> PeerError {
    PeerError::Transport(err.to_string())
}

/// Passes 2xx responses through and turns everything else into `Rejected`.
async fn accept(response: Response) -> Result<Response, PeerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let reason = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    Err(PeerError::Rejected {
        status: status.as_u16(),
        reason,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PeerError> {
    response
        .json()
        .await
        .map_err(|err| PeerError::Decode(err.to_string()))
}
