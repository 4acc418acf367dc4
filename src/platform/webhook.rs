//! HTTPS webhook transport: Telegram POSTs each update to `webhook_path`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::{info, warn};

use crate::bot::AppState;
use crate::dispatch::{self, DispatchResult};
use crate::update::InboundEvent;

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(receive_update))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn receive_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    let event = InboundEvent::new(body.to_vec()).with_headers(headers);
    let result = dispatch::handle(&state, &event).await;
    respond(&result)
}

pub fn respond(result: &DispatchResult) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(result.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result.body()))
}

pub async fn serve(state: Arc<AppState>, addr: SocketAddr, webhook_path: &str) -> Result<()> {
    let app = router(state, webhook_path);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook listening on http://{}{}", addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server error")?;

    info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{state_with, RecordingSender, StubModel};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_success_maps_to_200() {
        let sender = Arc::new(RecordingSender::new());
        let model = Arc::new(StubModel::replying("Be confident and curious."));
        let state = Arc::new(state_with(sender.clone(), Some(model)));

        let (status, Json(body)) = receive_update(
            State(state),
            HeaderMap::new(),
            Bytes::from_static(br#"{"message":{"text":"/ask How?","chat":{"id":42}}}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Success"}));
        assert_eq!(sender.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_maps_to_500() {
        let sender = Arc::new(RecordingSender::new());
        let state = Arc::new(state_with(sender.clone(), None));

        let (status, Json(body)) =
            receive_update(State(state), HeaderMap::new(), Bytes::from_static(b"not-json")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_body_maps_to_500_json() {
        let sender = Arc::new(RecordingSender::new());
        let state = Arc::new(state_with(sender.clone(), None));

        let response = router(state, "/webhook")
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .body(Body::from(vec![0xff, 0xfe, b'{']))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().contains("UTF-8"));
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await, "ok");
    }
}
