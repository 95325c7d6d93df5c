use axum::{
    extract::{Path, State},
    routing::{post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::dispatch_dto::{ApiResponse, CreateDriverRequest, CreateTruckRequest, UpdateTruckStateRequest};
use crate::models::{Caller, Driver, Truck};
use crate::repositories::FuelStore;
use crate::services::NewTruck;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_truck_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", post(register_truck::<S>))
        .route("/:id/state", put(override_truck_state::<S>))
}

pub fn create_driver_router<S: FuelStore>() -> Router<AppState<S>> {
    Router::new().route("/", post(register_driver::<S>))
}

async fn register_truck<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateTruckRequest>,
) -> Result<Json<ApiResponse<Truck>>, AppError> {
    request.validate()?;
    let truck = state
        .service
        .register_truck(
            &caller,
            NewTruck {
                plate: request.plate,
                fuel_type: request.fuel_type,
                capacity: request.capacity,
                last_remaining: request.last_remaining,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        truck,
        "Camión registrado exitosamente".to_string(),
    )))
}

async fn override_truck_state<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTruckStateRequest>,
) -> Result<Json<ApiResponse<Truck>>, AppError> {
    let truck = state
        .service
        .override_truck_state(&caller, id, request.state)
        .await?;
    Ok(Json(ApiResponse::success(truck)))
}

async fn register_driver<S: FuelStore>(
    State(state): State<AppState<S>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateDriverRequest>,
) -> Result<Json<ApiResponse<Driver>>, AppError> {
    request.validate()?;
    let driver = state.service.register_driver(&caller, request.name).await?;
    Ok(Json(ApiResponse::success_with_message(
        driver,
        "Conductor registrado exitosamente".to_string(),
    )))
}
