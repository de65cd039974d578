//! HTTP surface of a node.
//!
//! Maps the routes peers and clients use onto [`Node`]. Handlers are thin: they
//! decode, call the node, and encode. Only the write path and message lookup can
//! fail.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cluster::NodeId;
use crate::error::NodeError;
use crate::message::{Message, MessageId};
use crate::node::Node;
use crate::protocol::{
    ClockReading, ErrorBody, LeaderNotice, NodeState, ReplicaAck, WriteRequest, WriteResponse,
};

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/messages", post(submit_write).get(list_messages))
        .route("/messages/:id", get(get_message))
        .route("/message_received", post(receive_replica))
        .route("/leader", get(query_leader).put(notify_leader))
        .route("/election", post(request_election))
        .route("/lamport_time", get(clock_time))
        .route("/state", get(node_state))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// A bound listener plus the node it serves.
pub struct Server {
    listener: TcpListener,
    node: Arc<Node>,
}

impl Server {
    pub fn new(listener: TcpListener, node: Arc<Node>) -> Self {
        Self { listener, node }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Server { listener, node } = self;
        let id = node.id();
        axum::serve(listener, router(node))
            .with_graceful_shutdown(shutdown)
            .await
            .context("http server failed")?;
        info!(node = id, "server stopped");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

enum ApiError {
    Node(NodeError),
    NotFound(MessageId),
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        ApiError::Node(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("message {id} not found")),
            ApiError::Node(err) => {
                let status = match &err {
                    NodeError::NoLeaderAvailable => StatusCode::SERVICE_UNAVAILABLE,
                    NodeError::NotLeader { .. } => StatusCode::CONFLICT,
                    NodeError::LeaderUnreachable { .. } => StatusCode::BAD_GATEWAY,
                    // Pass the leader's verdict through when it is a real error status.
                    NodeError::ForwardRejected { status, .. } => StatusCode::from_u16(*status)
                        .ok()
                        .filter(|code| code.is_client_error() || code.is_server_error())
                        .unwrap_or(StatusCode::BAD_GATEWAY),
                };
                (status, err.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn submit_write(
    State(node): State<Arc<Node>>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let id = node.submit_write(request.content, request.forwarded).await?;
    Ok(Json(WriteResponse { id }))
}

async fn receive_replica(
    State(node): State<Arc<Node>>,
    Json(message): Json<Message>,
) -> Json<ReplicaAck> {
    Json(node.receive_replica(message))
}

async fn query_leader(State(node): State<Arc<Node>>) -> Json<Option<NodeId>> {
    Json(node.query_leader())
}

async fn notify_leader(
    State(node): State<Arc<Node>>,
    Json(notice): Json<LeaderNotice>,
) -> StatusCode {
    node.notify_leader(notice.leader);
    StatusCode::NO_CONTENT
}

async fn request_election(State(node): State<Arc<Node>>) -> StatusCode {
    // Detached; the caller only needs to know the request landed.
    drop(node.handle_election_request());
    StatusCode::ACCEPTED
}

async fn clock_time(State(node): State<Arc<Node>>) -> Json<ClockReading> {
    Json(node.clock_time())
}

async fn list_messages(State(node): State<Arc<Node>>) -> Json<Vec<Message>> {
    Json(node.list_messages())
}

async fn get_message(
    State(node): State<Arc<Node>>,
    Path(id): Path<MessageId>,
) -> Result<Json<Message>, ApiError> {
    node.get_message(id)
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn node_state(State(node): State<Arc<Node>>) -> Json<NodeState> {
    Json(node.state())
}
