//! Gateway endpoints that answer without contacting any node.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ringkv_gateway::{router, GatewayConfig, GatewayState};
use std::collections::BTreeMap;
use tower::ServiceExt;

fn test_state() -> std::sync::Arc<GatewayState> {
    let nodes: BTreeMap<u32, String> = [
        (1, "http://localhost:18001".to_string()),
        (2, "http://localhost:18002".to_string()),
    ]
    .into_iter()
    .collect();
    GatewayState::new(GatewayConfig::new(nodes))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_reflects_majority() {
    let state = test_state();
    let app = router(std::sync::Arc::clone(&state));

    let body = body_json(app.clone().oneshot(get_req("/health")).await.unwrap()).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cluster_healthy"], true);

    state.mark_unhealthy(1);
    let body = body_json(app.oneshot(get_req("/health")).await.unwrap()).await;
    // 1 of 2 nodes is not a majority (needs floor(2/2)+1 = 2).
    assert_eq!(body["cluster_healthy"], false);
}

#[tokio::test]
async fn test_stats_reports_counters() {
    let state = test_state();
    let app = router(state);

    let body = body_json(app.oneshot(get_req("/stats")).await.unwrap()).await;
    assert_eq!(body["cluster"]["total_nodes"], 2);
    assert_eq!(body["cluster"]["healthy_nodes"], 2);
    assert_eq!(body["gateway"]["total_requests"], 0);
    assert_eq!(body["gateway"]["success_rate"], 100.0);
}

#[tokio::test]
async fn test_get_with_no_healthy_nodes_is_503() {
    let state = test_state();
    state.mark_unhealthy(1);
    state.mark_unhealthy(2);
    let app = router(state);

    let response = app.oneshot(get_req("/get/somekey")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_service_info() {
    let app = router(test_state());
    let body = body_json(app.oneshot(get_req("/")).await.unwrap()).await;
    assert_eq!(body["service"], "ringkv gateway");
    assert_eq!(body["cluster_size"], 2);
}
