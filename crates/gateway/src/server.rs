//! Gateway HTTP routes.
//!
//! Client-facing key operations are forwarded to the node chosen by the
//! ring; the cluster endpoints aggregate node health and key placement.
//! Upstream responses pass through with their status. 503 means no healthy
//! replica could serve the key.

use crate::state::GatewayState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use ringkv_core::{Error, Result, Value};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// Body of `POST /set/{key}`.
#[derive(Debug, Deserialize)]
pub struct GatewaySetBody {
    /// Value to store under the path key.
    pub value: Value,
}

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

type ApiResult = std::result::Result<Response, ApiError>;

/// Build the gateway router over its state.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/set/:key", post(set_key))
        .route("/get/:key", get(get_key))
        .route("/delete/:key", delete(delete_key))
        .route("/exists/:key", get(exists_key))
        .route("/cluster/status", get(cluster_status))
        .route("/cluster/distribution", get(cluster_distribution))
        .route("/stats", get(gateway_stats))
        .route("/health", get(gateway_health))
        .route("/", get(service_info))
        .with_state(state)
}

/// Bind and serve the gateway until the process is stopped.
pub async fn serve(state: Arc<GatewayState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, nodes = state.config.nodes.len(), "gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn count_request(state: &GatewayState) {
    state.total_requests.fetch_add(1, Ordering::Relaxed);
}

fn count_failure(state: &GatewayState) {
    state.failed_requests.fetch_add(1, Ordering::Relaxed);
}

/// Pass an upstream response through with its status code.
async fn relay(state: &GatewayState, response: reqwest::Response) -> ApiResult {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|err| Error::Upstream(err.to_string()))?;
    if !status.is_success() {
        count_failure(state);
    }
    Ok((status, Json(body)).into_response())
}

async fn set_key(
    State(state): State<Arc<GatewayState>>,
    Path(key): Path<String>,
    Json(body): Json<GatewaySetBody>,
) -> ApiResult {
    count_request(&state);
    let (node_id, url) = state.healthy_route(&key).map_err(|err| {
        count_failure(&state);
        err
    })?;

    let response = state
        .client
        .post(format!("{url}/set"))
        .json(&json!({ "key": key, "value": body.value, "is_replica": false }))
        .timeout(state.config.forward_timeout)
        .send()
        .await
        .map_err(|err| {
            count_failure(&state);
            Error::Upstream(format!("node {node_id}: {err}"))
        })?;
    relay(&state, response).await
}

async fn get_key(State(state): State<Arc<GatewayState>>, Path(key): Path<String>) -> ApiResult {
    count_request(&state);
    let replicas = state.healthy_replicas(&key).map_err(|err| {
        count_failure(&state);
        err
    })?;

    for (node_id, url) in &replicas {
        let attempt = state
            .client
            .get(format!("{url}/get/{key}"))
            .timeout(state.config.forward_timeout)
            .send()
            .await;
        match attempt {
            Ok(response) if response.status().is_success() => {
                return relay(&state, response).await;
            }
            Ok(response) => {
                tracing::warn!(node_id, status = %response.status(), "replica read rejected");
            }
            Err(err) => {
                tracing::warn!(node_id, %err, "replica read failed, trying next");
            }
        }
    }

    count_failure(&state);
    Err(Error::ServiceUnavailable(format!(
        "all replicas for key '{key}' are unavailable"
    ))
    .into())
}

async fn delete_key(State(state): State<Arc<GatewayState>>, Path(key): Path<String>) -> ApiResult {
    count_request(&state);
    let (node_id, url) = state.healthy_route(&key).map_err(|err| {
        count_failure(&state);
        err
    })?;

    let response = state
        .client
        .delete(format!("{url}/delete/{key}"))
        .timeout(state.config.forward_timeout)
        .send()
        .await
        .map_err(|err| {
            count_failure(&state);
            Error::Upstream(format!("node {node_id}: {err}"))
        })?;
    relay(&state, response).await
}

async fn exists_key(State(state): State<Arc<GatewayState>>, Path(key): Path<String>) -> ApiResult {
    count_request(&state);
    let (node_id, url) = state.primary_route(&key).map_err(|err| {
        count_failure(&state);
        err
    })?;

    let response = state
        .client
        .get(format!("{url}/exists/{key}"))
        .timeout(state.config.forward_timeout)
        .send()
        .await
        .map_err(|err| {
            count_failure(&state);
            Error::Upstream(format!("node {node_id}: {err}"))
        })?;
    relay(&state, response).await
}

async fn cluster_status(State(state): State<Arc<GatewayState>>) -> ApiResult {
    let mut nodes = serde_json::Map::new();
    for (node_id, url) in &state.config.nodes {
        let in_view = state.membership.read().healthy.contains(node_id);
        let entry = match state
            .client
            .get(format!("{url}/health"))
            .timeout(state.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                let mut body: serde_json::Value =
                    response.json().await.unwrap_or_else(|_| json!({}));
                if let Some(object) = body.as_object_mut() {
                    object.insert("healthy".to_string(), json!(in_view));
                }
                body
            }
            Ok(response) => json!({
                "status": "unhealthy",
                "healthy": false,
                "error": format!("health returned {}", response.status()),
            }),
            Err(err) => json!({
                "status": "unhealthy",
                "healthy": false,
                "error": err.to_string(),
            }),
        };
        nodes.insert(format!("node_{node_id}"), entry);
    }

    let healthy = state.healthy_count();
    Ok(Json(json!({
        "cluster_size": state.config.nodes.len(),
        "healthy_nodes": healthy,
        "unhealthy_nodes": state.config.nodes.len() - healthy,
        "nodes": nodes,
    }))
    .into_response())
}

async fn cluster_distribution(State(state): State<Arc<GatewayState>>) -> ApiResult {
    let mut distribution = serde_json::Map::new();
    for (node_id, url) in &state.config.nodes {
        let entry = match state
            .client
            .get(format!("{url}/keys"))
            .timeout(state.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                let body: serde_json::Value = response.json().await.unwrap_or_else(|_| json!({}));
                let sample: Vec<serde_json::Value> = body["keys"]
                    .as_array()
                    .map(|keys| keys.iter().take(10).cloned().collect())
                    .unwrap_or_default();
                json!({
                    "key_count": body["count"],
                    "keys": sample,
                })
            }
            Ok(response) => json!({ "error": format!("keys returned {}", response.status()) }),
            Err(err) => json!({ "error": err.to_string() }),
        };
        distribution.insert(format!("node_{node_id}"), entry);
    }
    Ok(Json(serde_json::Value::Object(distribution)).into_response())
}

async fn gateway_stats(State(state): State<Arc<GatewayState>>) -> ApiResult {
    let total = state.total_requests.load(Ordering::Relaxed);
    let failed = state.failed_requests.load(Ordering::Relaxed);
    let success_rate = if total > 0 {
        (total - failed) as f64 / total as f64 * 100.0
    } else {
        100.0
    };
    let healthy = state.healthy_count();
    Ok(Json(json!({
        "gateway": {
            "uptime_seconds": state.uptime_seconds(),
            "total_requests": total,
            "failed_requests": failed,
            "success_rate": success_rate,
        },
        "cluster": {
            "total_nodes": state.config.nodes.len(),
            "healthy_nodes": healthy,
            "unhealthy_nodes": state.config.nodes.len() - healthy,
        },
    }))
    .into_response())
}

async fn gateway_health(State(state): State<Arc<GatewayState>>) -> ApiResult {
    Ok(Json(json!({
        "status": "healthy",
        "cluster_healthy": state.is_cluster_healthy(),
    }))
    .into_response())
}

async fn service_info(State(state): State<Arc<GatewayState>>) -> ApiResult {
    Ok(Json(json!({
        "service": "ringkv gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "cluster_size": state.config.nodes.len(),
        "healthy_nodes": state.healthy_count(),
        "status": "running",
    }))
    .into_response())
}
