//! Rutas HTTP
//!
//! Adaptador delgado sobre `ReconciliationService`. Todo bajo `/api` pasa por
//! el middleware JWT; `/health` es público.

pub mod assignment_routes;
pub mod discharge_routes;
pub mod sweep_routes;
pub mod truck_routes;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::json;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::{auth_middleware, cors_layer};
use crate::repositories::FuelStore;
use crate::state::AppState;

pub fn create_app_router<S: FuelStore>(state: AppState<S>) -> Router {
    let api = Router::new()
        .nest("/trucks", truck_routes::create_truck_router())
        .nest("/drivers", truck_routes::create_driver_router())
        .nest("/assignments", assignment_routes::create_assignment_router())
        .nest("/discharges", discharge_routes::create_discharge_router())
        .nest("/sweeps", sweep_routes::create_sweep_router())
        .nest("/numbering", sweep_routes::create_numbering_router())
        .route_layer(from_fn_with_state(state.jwt.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "fuel_dispatch",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
