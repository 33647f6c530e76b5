// HTTP + WebSocket routes

mod error;
mod http;
mod ws;

pub use error::ApiError;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::broadcaster::Broadcaster;
use crate::config::AppConfig;
use crate::telemetry::Telemetry;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) broadcaster: Arc<Broadcaster>,
    pub(crate) config: AppConfig,
}

pub fn app(telemetry: Arc<Telemetry>, broadcaster: Arc<Broadcaster>, config: AppConfig) -> Router {
    let state = AppState {
        telemetry,
        broadcaster,
        config,
    };
    Router::new()
        .route("/", get(|| async { "logique: container telemetry" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/api/system-stats", get(http::system_stats_handler))
        .route("/api/containers", get(http::containers_handler))
        .route("/api/container/{id}", get(http::container_detail_handler))
        .route("/api/container/{id}/logs", get(http::container_logs_handler))
        .route("/api/container/{id}/{action}", post(http::container_action_handler))
        .route("/api/networks", get(http::networks_handler))
        .route("/api/network/{name}/logs", get(http::network_logs_handler))
        .route("/api/docker/info", get(http::daemon_info_handler))
        .route("/ws/system", get(ws::ws_system)) // WS /ws/system
        .route("/ws/containers", get(ws::ws_containers)) // WS /ws/containers
        .route("/ws/container_logs/{id}", get(ws::ws_container_logs))
        .route("/ws/network_logs/{name}", get(ws::ws_network_logs))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
