use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::dispatch_dto::{
    AllocateFuelRequest, ApiResponse, CompleteAssignmentRequest, CreateAssignmentRequest,
    RecordDischargeRequest,
};
use crate::models::{
    Assignment, AssignmentNote, AssignmentNoteRecord, Caller, ClientAssignment, Discharge,
};
use crate::repositories::FuelStore;
use crate::services::AssignmentSummary;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_assignment_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", post(create_assignment::<S>))
        .route("/:id", get(get_assignment::<S>))
        .route("/:id/allocations", post(allocate_fuel::<S>))
        .route("/:id/discharges", post(record_discharge::<S>))
        .route("/:id/complete", post(complete_assignment::<S>))
        .route("/:id/notes", post(add_note::<S>).get(list_notes::<S>))
}

async fn create_assignment<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateAssignmentRequest>,
) -> Result<Json<ApiResponse<Assignment>>, AppError> {
    request.validate()?;
    let assignment = state
        .service
        .create_assignment(
            &caller,
            request.truck_id,
            request.driver_id,
            request.total_loaded,
            request.notes,
        )
        .await?;
    let message = format!("Asignación {} creada", assignment.dispatch_number);
    Ok(Json(ApiResponse::success_with_message(assignment, message)))
}

async fn get_assignment<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AssignmentSummary>>, AppError> {
    let summary = state.service.assignment_summary(&caller, id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn allocate_fuel<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(request): Json<AllocateFuelRequest>,
) -> Result<Json<ApiResponse<ClientAssignment>>, AppError> {
    request.validate()?;
    let allocation = state
        .service
        .allocate_to_client(&caller, id, request.customer_id, request.allocated_quantity)
        .await?;
    Ok(Json(ApiResponse::success(allocation)))
}

async fn record_discharge<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(request): Json<RecordDischargeRequest>,
) -> Result<Json<ApiResponse<Discharge>>, AppError> {
    let discharge = state
        .service
        .record_discharge(&caller, id, request.customer_id, request.amount, request.meter_readings)
        .await?;
    let message = format!("Vale {} registrado", discharge.vale_number);
    Ok(Json(ApiResponse::success_with_message(discharge, message)))
}

async fn complete_assignment<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    request: Option<Json<CompleteAssignmentRequest>>,
) -> Result<Json<ApiResponse<Assignment>>, AppError> {
    let force = request.map(|Json(r)| r.force).unwrap_or(false);
    let assignment = state.service.complete_assignment(&caller, id, force).await?;
    Ok(Json(ApiResponse::success(assignment)))
}

async fn add_note<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(note): Json<AssignmentNote>,
) -> Result<Json<ApiResponse<AssignmentNoteRecord>>, AppError> {
    let record = state.service.add_note(&caller, id, note).await?;
    Ok(Json(ApiResponse::success(record)))
}

async fn list_notes<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<AssignmentNoteRecord>>>, AppError> {
    let notes = state.service.list_notes(&caller, id).await?;
    Ok(Json(ApiResponse::success(notes)))
}
