//! Health check endpoint

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub build: &'static str,
    pub uptime_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.startup_time).num_seconds();
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok",
        module: "polycast-pg",
        version: env!("CARGO_PKG_VERSION"),
        build: env!("GIT_HASH"),
        uptime_seconds,
        last_error,
    })
}
