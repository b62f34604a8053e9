//! HTTP API
//!
//! Routes:
//! - `POST /generate/:date` - run a dispatch pass for a date
//! - `GET  /status/:date` - per-language status report
//! - `POST /sweep/:date` - run a reconciliation sweep now
//! - `GET  /parameters` - current generation parameters
//! - `PUT  /parameters` - update generation parameters
//! - `GET  /events` - SSE stream of generation events
//! - `GET  /health` - liveness and build info

pub mod generation;
pub mod health;
pub mod parameters;
pub mod sse;

use crate::state::AppState;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(generation::routes())
        .merge(parameters::routes())
        .merge(health::routes())
        .route("/events", get(sse::event_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
