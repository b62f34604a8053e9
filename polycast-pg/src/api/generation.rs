//! Generation trigger, status and sweep endpoints

use crate::error::ApiResult;
use crate::services::aggregator::{self, DateStatus};
use crate::services::dispatcher::{DispatchError, DispatchReport};
use crate::services::sweep::{self, SweepReport};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/generate/:date", post(trigger_generation))
        .route("/status/:date", get(generation_status))
        .route("/sweep/:date", post(trigger_sweep))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub force_refresh: bool,
}

/// POST /generate/:date
///
/// Runs a dispatch pass synchronously and returns the report. Pollers for
/// accepted submissions keep running in the background; progress arrives on
/// the event stream and in the status report.
async fn trigger_generation(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<Json<DispatchReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    match state
        .dispatcher
        .ensure_generated(date, request.force_refresh)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            // An unready digest is an operator condition, not a fault
            if !matches!(e, DispatchError::ContentNotReady(_)) {
                state.record_error(e.to_string()).await;
            }
            Err(e.into())
        }
    }
}

/// GET /status/:date
async fn generation_status(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<Json<DateStatus>> {
    let status = aggregator::status_for_date(&state.db, date).await?;
    Ok(Json(status))
}

/// POST /sweep/:date
async fn trigger_sweep(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> ApiResult<Json<SweepReport>> {
    let params = *state.params.read().await;
    let report = sweep::sweep_date(
        &state.db,
        &state.event_bus,
        state.audio.as_ref(),
        &params,
        &state.date_locks,
        date,
    )
    .await?;
    Ok(Json(report))
}
