//! HTTP routes for one node.
//!
//! Store operations run on the worker pool, bridged onto the runtime with
//! `spawn_blocking` so handlers never block an executor thread. Errors map
//! to 500 with the message echoed in the body; the cluster-unavailable
//! kinds map to 503.

use crate::replication;
use crate::state::NodeState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ringkv_core::{Error, NodeId, Result, Value};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// Body of `POST /set`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetBody {
    /// Key to bind.
    pub key: String,
    /// Value to store.
    pub value: Value,
    /// True when this write is replication fan-out from a peer.
    #[serde(default)]
    pub is_replica: bool,
}

#[derive(Debug, Deserialize)]
struct ReplicaFlag {
    #[serde(default)]
    is_replica: bool,
}

#[derive(Debug, Deserialize)]
struct RegisterPeerParams {
    peer_id: NodeId,
    peer_url: String,
}

/// Error wrapper mapping store errors onto HTTP status codes.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult = std::result::Result<Json<serde_json::Value>, ApiError>;

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| Error::Upstream(format!("worker task join: {err}")))?
}

/// Build the node's router over its state.
pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/set", post(set_key))
        .route("/get/:key", get(get_key))
        .route("/delete/:key", delete(delete_key))
        .route("/exists/:key", get(exists_key))
        .route("/keys", get(list_keys))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/register_peer", post(register_peer))
        .route("/", get(service_info))
        .with_state(state)
}

/// Bind and serve the node until the process is stopped.
pub async fn serve(state: Arc<NodeState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(node_id = state.node_id(), %addr, "node listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn set_key(State(state): State<Arc<NodeState>>, Json(body): Json<SetBody>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let key = body.key.clone();
    let value = body.value.clone();
    run_blocking(move || pool.set(&key, value)).await?;
    state.total_writes.fetch_add(1, Ordering::Relaxed);

    if !body.is_replica && !state.peers.is_empty() {
        replication::spawn_replicate_set(Arc::clone(&state), body.key, body.value);
    }
    Ok(Json(json!({ "status": "ok", "node_id": state.node_id() })))
}

async fn get_key(State(state): State<Arc<NodeState>>, Path(key): Path<String>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let lookup = key.clone();
    let value = run_blocking(move || pool.get(&lookup)).await?;
    state.total_reads.fetch_add(1, Ordering::Relaxed);

    if let Some(found) = &value {
        if !state.peers.is_empty() {
            replication::spawn_read_repair(Arc::clone(&state), key.clone(), found.clone());
        }
    }
    Ok(Json(json!({
        "key": key,
        "value": value,
        "node_id": state.node_id(),
    })))
}

async fn delete_key(
    State(state): State<Arc<NodeState>>,
    Path(key): Path<String>,
    Query(flag): Query<ReplicaFlag>,
) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let target = key.clone();
    let deleted = run_blocking(move || pool.delete(&target)).await?;
    state.total_writes.fetch_add(1, Ordering::Relaxed);

    if !flag.is_replica && !state.peers.is_empty() {
        replication::spawn_replicate_delete(Arc::clone(&state), key);
    }
    Ok(Json(json!({ "deleted": deleted, "node_id": state.node_id() })))
}

async fn exists_key(State(state): State<Arc<NodeState>>, Path(key): Path<String>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let lookup = key.clone();
    let exists = run_blocking(move || pool.exists(&lookup)).await?;
    Ok(Json(json!({
        "key": key,
        "exists": exists,
        "node_id": state.node_id(),
    })))
}

async fn list_keys(State(state): State<Arc<NodeState>>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let keys = run_blocking(move || pool.keys()).await?;
    Ok(Json(json!({
        "count": keys.len(),
        "keys": keys,
        "node_id": state.node_id(),
    })))
}

async fn health(State(state): State<Arc<NodeState>>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let store_size = run_blocking(move || pool.len()).await?;
    Ok(Json(json!({
        "node_id": state.node_id(),
        "status": "healthy",
        "uptime_seconds": state.uptime_seconds(),
        "store_size": store_size,
        "total_reads": state.total_reads.load(Ordering::Relaxed),
        "total_writes": state.total_writes.load(Ordering::Relaxed),
        "replication_failures": state.replication_failures.load(Ordering::Relaxed),
        "peers": state.peers.len(),
    })))
}

/// Full statistics including the data snapshot anti-entropy compares.
async fn stats(State(state): State<Arc<NodeState>>) -> ApiResult {
    let pool = Arc::clone(&state.pool);
    let items = run_blocking(move || pool.items()).await?;
    let data: BTreeMap<String, Value> = items.into_iter().collect();
    let pool_stats = state.pool.stats();
    Ok(Json(json!({
        "node_id": state.node_id(),
        "uptime_seconds": state.uptime_seconds(),
        "total_reads": state.total_reads.load(Ordering::Relaxed),
        "total_writes": state.total_writes.load(Ordering::Relaxed),
        "replication_failures": state.replication_failures.load(Ordering::Relaxed),
        "pool": {
            "running": pool_stats.running,
            "workers": pool_stats.workers,
            "queue_depth": pool_stats.queue_depth,
            "total_requests": pool_stats.total_requests,
            "processed_per_worker": pool_stats.processed_per_worker,
        },
        "data": data,
    })))
}

async fn register_peer(
    State(state): State<Arc<NodeState>>,
    Query(params): Query<RegisterPeerParams>,
) -> ApiResult {
    state.peers.insert(params.peer_id, params.peer_url);
    info!(peer_id = params.peer_id, "registered peer");
    Ok(Json(json!({
        "status": "ok",
        "message": format!("Registered peer {}", params.peer_id),
        "total_peers": state.peers.len(),
    })))
}

async fn service_info(State(state): State<Arc<NodeState>>) -> ApiResult {
    Ok(Json(json!({
        "service": "ringkv node",
        "node_id": state.node_id(),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    })))
}
