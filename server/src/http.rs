//! Read-only status endpoints and the router that ties them to `/ws`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use std::collections::BTreeMap;
use tower_http::cors::CorsLayer;

use crate::protocol::{RoomSummary, StatsWire};
use crate::ws::{ws_handler, AppState};

pub const SERVICE_NAME: &str = "pong-server";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/rooms", get(rooms_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn rooms_handler(State(state): State<AppState>) -> Json<BTreeMap<String, RoomSummary>> {
    Json(state.registry.list_rooms().await)
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsWire> {
    Json(state.registry.stats().await)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
