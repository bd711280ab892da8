//! Axum-based webhook listener.
//!
//! The gateway is the only concurrent boundary: it parses, authenticates and
//! classifies inbound notifications, then enqueues them for the single
//! enforcement worker. It never touches snapshots or the tracker itself.
//! Body limits and request timeouts are enforced by tower layers.

mod handlers;
mod signature;

pub use signature::{sign, verify_signature};

use crate::dispatch::{Notification, Stats};
use crate::error::GatewayError;
use axum::{
    Router,
    routing::{get, post},
};
use handlers::{handle_health, handle_status, handle_webhook};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) — prevents slow-loris attacks
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: mpsc::Sender<Notification>,
    pub stats: Arc<Stats>,
    pub webhook_secret: Option<Arc<str>>,
    pub monitored_collection: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

/// Bind and serve the gateway.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<(), GatewayError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
    tracing::info!("webhook gateway listening on {addr}");
    run_gateway_with_listener(listener, state).await
}

/// Serve the gateway from a pre-bound listener (test seam).
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<(), GatewayError> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| GatewayError::Bind(e.to_string()))
}
