use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use std::sync::atomic::Ordering;

use super::AppState;
use super::signature::verify_signature;
use crate::dispatch::{Disposition, classify};

/// GET /health — liveness only, no secrets leaked
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /status — queue depth and processing counters
pub(super) async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "running",
        "stats": state.stats.snapshot(),
        "supported_events": [
            "page.properties_updated", "page.created", "page.deleted",
        ],
    });
    Json(body)
}

/// POST /webhook — the notification ingress
pub(super) async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // ── Signature auth (when a secret is configured) ──
    if let Some(ref secret) = state.webhook_secret {
        let signature = headers
            .get("X-Guard-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, &body, signature) {
            tracing::warn!(
                "webhook signature verification failed (signature: {})",
                if signature.is_empty() { "missing" } else { "invalid" }
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Invalid signature" })),
            );
        }
    }

    // ── Parse body ──
    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid JSON payload" })),
        );
    };

    match classify(&payload, &state.monitored_collection) {
        Disposition::VerificationEcho(token) => {
            tracing::info!("verification token received — echoing back");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "verification_token": token })),
            )
        }
        Disposition::SelfOriginated => {
            tracing::debug!("own integration's webhook ignored");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ignored_system" })),
            )
        }
        Disposition::Irrelevant => {
            state.stats.ignored.fetch_add(1, Ordering::Relaxed);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "ignored_irrelevant" })),
            )
        }
        Disposition::ForeignCollection => {
            state.stats.ignored.fetch_add(1, Ordering::Relaxed);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "different_collection" })),
            )
        }
        Disposition::Invalid(reason) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": reason })),
        ),
        Disposition::Event(notification) => {
            tracing::info!(
                task = crate::directory::short_id(&notification.page_id),
                kind = ?notification.kind,
                "relevant notification enqueued"
            );
            if state.queue.send(notification).await.is_err() {
                tracing::error!("worker queue closed — dropping notification");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(serde_json::json!({ "error": "worker unavailable" })),
                );
            }
            state.stats.pending.fetch_add(1, Ordering::Relaxed);
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "received" })),
            )
        }
    }
}
