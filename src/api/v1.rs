use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::error::ApiError;
use crate::{
    controller::{AppState, LoopPhase},
    domain::PlantSnapshot,
    sinks::{DashboardPayload, HistoryRecord},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/state", get(get_state))
        .route("/history", get(get_history))
        .route("/update_data", post(update_data))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: LoopPhase,
    pub timestamp: DateTime<Utc>,
}

pub async fn healthz(State(st): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        phase: st.phase(),
        timestamp: Utc::now(),
    })
}

/// Last snapshot published by the control loop.
pub async fn get_state(State(st): State<AppState>) -> Result<Json<PlantSnapshot>, ApiError> {
    st.plant
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no plant state published yet".into()))
}

pub async fn get_history(State(st): State<AppState>) -> Json<HistoryRecord> {
    Json(st.history.snapshot())
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub message: &'static str,
}

/// Dashboard ingest. Rows are stamped with the receive time.
pub async fn update_data(
    State(st): State<AppState>,
    payload: Result<Json<DashboardPayload>, JsonRejection>,
) -> Result<Json<UpdateResponse>, ApiError> {
    let Json(payload) = payload?;
    info!(
        pumps = payload.pumps.len(),
        aeration_basins = payload.aeration_basins.len(),
        "dashboard update received"
    );
    st.history.record(&payload, Utc::now());
    Ok(Json(UpdateResponse {
        message: "Data updated successfully",
    }))
}
