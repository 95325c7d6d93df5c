use axum::{extract::State, routing::post, Extension, Json, Router};

use crate::dto::dispatch_dto::{ApiResponse, NextNumberRequest, NumberResponse};
use crate::models::Caller;
use crate::repositories::FuelStore;
use crate::services::{FleetRefreshReport, IdentifierPrefix, SweepReport};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_sweep_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/stale-assignments", post(sweep_stale_assignments::<S>))
        .route("/fleet-state", post(refresh_fleet_state::<S>))
}

pub fn create_numbering_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new().route("/vale", post(next_vale_number::<S>))
}

async fn sweep_stale_assignments<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<SweepReport>>, AppError> {
    let report = state.service.sweep_stale_assignments(&caller).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn refresh_fleet_state<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<FleetRefreshReport>>, AppError> {
    let report = state.service.refresh_fleet_state(&caller).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn next_vale_number<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    request: Option<Json<NextNumberRequest>>,
) -> Result<Json<ApiResponse<NumberResponse>>, AppError> {
    let prefix = request
        .map(|Json(r)| r.prefix)
        .unwrap_or(IdentifierPrefix::Vale);
    let number = state.service.next_vale_number(&caller, prefix).await?;
    Ok(Json(ApiResponse::success(NumberResponse { number })))
}
