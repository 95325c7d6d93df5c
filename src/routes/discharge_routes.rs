use axum::{
    extract::{Path, State},
    routing::put,
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::dto::dispatch_dto::{ApiResponse, CorrectDischargeRequest};
use crate::models::{Assignment, Caller, Discharge};
use crate::repositories::FuelStore;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_discharge_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new().route("/:id", put(correct_discharge::<S>).delete(delete_discharge::<S>))
}

async fn correct_discharge<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(request): Json<CorrectDischargeRequest>,
) -> Result<Json<ApiResponse<Discharge>>, AppError> {
    let discharge = state
        .service
        .correct_discharge(&caller, id, request.amount, request.meter_readings)
        .await?;
    Ok(Json(ApiResponse::success(discharge)))
}

async fn delete_discharge<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Assignment>>, AppError> {
    let assignment = state.service.delete_discharge(&caller, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        assignment,
        "Descarga eliminada y saldo restituido".to_string(),
    )))
}
