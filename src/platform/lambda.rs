//! AWS Lambda transport: API Gateway proxy events carry the update as the body.

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::info;

use crate::bot::AppState;
use crate::dispatch;
use crate::update::InboundEvent;

async fn function_handler(state: &AppState, event: Request) -> Result<Response<Body>, Error> {
    let body = match event.body() {
        Body::Empty => Vec::new(),
        Body::Text(text) => text.clone().into_bytes(),
        Body::Binary(bytes) => bytes.clone(),
    };

    let headers = event
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect();

    let result = dispatch::handle(state, &InboundEvent::new(body).with_headers(headers)).await;

    let resp = Response::builder()
        .status(result.status_code())
        .header("content-type", "application/json")
        .body(result.body().to_string().into())
        .map_err(Box::new)?;
    Ok(resp)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    info!("Starting Lambda runtime...");
    run(service_fn(move |event: Request| {
        let state = state.clone();
        async move { function_handler(&state, event).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("Lambda runtime error: {}", e))
}
