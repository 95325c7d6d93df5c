//! Sistema de manejo de errores
//!
//! Este módulo define la taxonomía de errores del motor de despacho
//! y su conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::services::fuel_ledger::LedgerError;

/// Errores principales de la aplicación
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Insufficient fuel: requested {requested} but only {available} available")]
    InsufficientFuel { requested: Decimal, available: Decimal },

    #[error("Capacity exceeded: {allocated} already allocated + {requested} requested > {total_loaded} loaded")]
    CapacityExceeded {
        requested: Decimal,
        allocated: Decimal,
        total_loaded: Decimal,
    },

    #[error("Customer {customer_id} already has an allocation on assignment {assignment_id}")]
    DuplicateAllocation { assignment_id: Uuid, customer_id: Uuid },

    #[error("Assignment has unresolved deliveries for {} customer(s)", customers.len())]
    IncompleteDeliveries { customers: Vec<Uuid> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Numbering exhausted for {prefix} in {year}")]
    NumberingExhausted { prefix: String, year: i32 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Errores del almacén que vale la pena reintentar una vez en lecturas idempotentes
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::InsufficientFuel { .. } => "INSUFFICIENT_FUEL",
            AppError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AppError::DuplicateAllocation { .. } => "DUPLICATE_ALLOCATION",
            AppError::IncompleteDeliveries { .. } => "INCOMPLETE_DELIVERIES",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::NumberingExhausted { .. } => "NUMBERING_EXHAUSTED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(_) => "DB_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidQuantity { requested } => AppError::InvalidQuantity(format!(
                "La cantidad debe ser mayor que cero (recibido {})",
                requested
            )),
            LedgerError::InsufficientFuel { requested, available } => {
                AppError::InsufficientFuel { requested, available }
            }
            LedgerError::CapacityExceeded {
                requested,
                allocated,
                total_loaded,
            } => AppError::CapacityExceeded {
                requested,
                allocated,
                total_loaded,
            },
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code().to_string();
        let (status, error, message, details) = match &self {
            AppError::InvalidQuantity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid Quantity",
                msg.clone(),
                None,
            ),
            AppError::InsufficientFuel { requested, available } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Insufficient Fuel",
                format!(
                    "Combustible insuficiente: solicitado {} gal, disponible {} gal",
                    requested, available
                ),
                Some(json!({ "requested": requested, "available": available })),
            ),
            AppError::CapacityExceeded {
                requested,
                allocated,
                total_loaded,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Capacity Exceeded",
                format!(
                    "La asignación excede la carga: {} asignado + {} solicitado > {} cargado",
                    allocated, requested, total_loaded
                ),
                Some(json!({
                    "requested": requested,
                    "allocated": allocated,
                    "total_loaded": total_loaded
                })),
            ),
            AppError::DuplicateAllocation {
                assignment_id,
                customer_id,
            } => (
                StatusCode::CONFLICT,
                "Duplicate Allocation",
                "El cliente ya tiene una asignación en este despacho".to_string(),
                Some(json!({ "assignment_id": assignment_id, "customer_id": customer_id })),
            ),
            AppError::IncompleteDeliveries { customers } => (
                StatusCode::CONFLICT,
                "Incomplete Deliveries",
                format!("Hay {} cliente(s) con entregas pendientes", customers.len()),
                Some(json!({ "customers": customers })),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", msg.clone(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", msg.clone(), None),
            AppError::ConcurrencyConflict(_) => (
                StatusCode::CONFLICT,
                "Concurrency Conflict",
                "El registro cambió mientras se procesaba la solicitud. Por favor reintente".to_string(),
                None,
            ),
            AppError::NumberingExhausted { prefix, year } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Numbering Exhausted",
                format!("Se agotó la numeración {} para el año {}", prefix, year),
                None,
            ),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg.clone(), None)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg.clone(), None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad Request", msg.clone(), None)
            }
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "Validation Error",
                "The provided data is invalid".to_string(),
                Some(json!(e)),
            ),
            AppError::Database(e) => {
                tracing::error!("❌ Error de base de datos: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database Error",
                    "An error occurred while accessing the database".to_string(),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("❌ Error interno: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                    "An unexpected error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            details,
            code,
        };

        (status, Json(body)).into_response()
    }
}

/// Resultado tipado para operaciones que pueden fallar
pub type AppResult<T> = Result<T, AppError>;

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, id: &Uuid) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

/// Función helper para crear errores de acceso prohibido
pub fn forbidden_error(operation: &str, reason: &str) -> AppError {
    AppError::Forbidden(format!("Cannot {}: {}", operation, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_fuel_keeps_numbers_in_message() {
        let err = AppError::InsufficientFuel {
            requested: Decimal::from(750),
            available: Decimal::from(700),
        };
        let text = err.to_string();
        assert!(text.contains("750"));
        assert!(text.contains("700"));
    }

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::InvalidQuantity("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::ConcurrencyConflict("x".into()), StatusCode::CONFLICT),
            (
                AppError::NumberingExhausted { prefix: "PE".into(), year: 2025 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::IncompleteDeliveries { customers: vec![] }, StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_ledger_error_conversion() {
        let err: AppError = LedgerError::CapacityExceeded {
            requested: Decimal::from(300),
            allocated: Decimal::from(250),
            total_loaded: Decimal::from(500),
        }
        .into();
        assert!(matches!(err, AppError::CapacityExceeded { .. }));
        assert!(!err.is_transient());
    }
}
