use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;
use crate::upload::upload_audio;
use crate::ws::ws_handler;

/// The single HTTP+signaling router: `/ws` for the persistent channel,
/// `/upload-audio` for the compatibility path, `/health` for liveness.
pub fn build_router(state: Arc<GatewayState>, forward_timeout_ms: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type"), HeaderName::from_static("authorization")]);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/upload-audio", post(upload_audio))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(forward_timeout_ms)))
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

/// `CorsLayer` answers a preflight `OPTIONS` with `200 OK` and no way to
/// override the status; §6.2 wants `204` for preflight. Wraps the response
/// after `CorsLayer` has attached its headers and downgrades it to `204`.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let response = next.run(request).await;

    if is_preflight && response.status() == StatusCode::OK {
        let (mut parts, _) = response.into_parts();
        parts.status = StatusCode::NO_CONTENT;
        return Response::from_parts(parts, axum::body::Body::empty());
    }

    response
}
