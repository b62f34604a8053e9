//! Generation parameter endpoints
//!
//! Parameters apply immediately to new dispatch passes and sweeps; pollers
//! already in flight keep the snapshot they started with.

use crate::db::settings;
use crate::error::{ApiError, ApiResult};
use crate::models::{DurationTier, GenerationParameters};
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new().route("/parameters", get(get_parameters).put(update_parameters))
}

/// GET /parameters
async fn get_parameters(State(state): State<AppState>) -> Json<GenerationParameters> {
    Json(*state.params.read().await)
}

/// Partial update; absent fields keep their current values
#[derive(Debug, Default, Deserialize)]
pub struct ParameterUpdate {
    pub poll_initial_delay_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub max_poll_attempts: Option<u32>,
    pub transport_retry_limit: Option<u32>,
    pub stale_after_secs: Option<i64>,
    pub sweep_interval_secs: Option<u64>,
    pub duration_tier: Option<DurationTier>,
}

/// PUT /parameters
async fn update_parameters(
    State(state): State<AppState>,
    Json(update): Json<ParameterUpdate>,
) -> ApiResult<Json<GenerationParameters>> {
    if update.poll_interval_secs == Some(0) {
        return Err(ApiError::BadRequest(
            "poll_interval_secs must be at least 1".to_string(),
        ));
    }
    if update.max_poll_attempts == Some(0) {
        return Err(ApiError::BadRequest(
            "max_poll_attempts must be at least 1".to_string(),
        ));
    }
    if update.transport_retry_limit == Some(0) {
        return Err(ApiError::BadRequest(
            "transport_retry_limit must be at least 1".to_string(),
        ));
    }
    if update.sweep_interval_secs == Some(0) {
        return Err(ApiError::BadRequest(
            "sweep_interval_secs must be at least 1".to_string(),
        ));
    }
    if matches!(update.stale_after_secs, Some(v) if v <= 0) {
        return Err(ApiError::BadRequest(
            "stale_after_secs must be positive".to_string(),
        ));
    }

    let mut params = state.params.write().await;

    if let Some(v) = update.poll_initial_delay_secs {
        params.poll_initial_delay_secs = v;
    }
    if let Some(v) = update.poll_interval_secs {
        params.poll_interval_secs = v;
    }
    if let Some(v) = update.max_poll_attempts {
        params.max_poll_attempts = v;
    }
    if let Some(v) = update.transport_retry_limit {
        params.transport_retry_limit = v;
    }
    if let Some(v) = update.stale_after_secs {
        params.stale_after_secs = v;
    }
    if let Some(v) = update.sweep_interval_secs {
        params.sweep_interval_secs = v;
    }
    if let Some(v) = update.duration_tier {
        params.duration_tier = v;
    }

    settings::persist_parameters(&state.db, &params).await?;
    info!(?params, "Generation parameters updated");

    Ok(Json(*params))
}
