//! Modelo de Assignment
//!
//! Una carga de camión entregada a un conductor para una jornada. El saldo
//! `total_remaining` solo lo modifica el servicio de reconciliación.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::client_assignment::{ClientAssignment, ClientAssignmentStatus};
use super::truck::FuelType;

/// Assignment principal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: Uuid,
    pub dispatch_number: String,
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    pub fuel_type: FuelType,
    pub total_loaded: Decimal,
    pub total_remaining: Decimal,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fase derivada de una asignación a partir de sus sub-unidades
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPhase {
    /// Queda combustible o hay entregas pendientes
    Open,
    /// Todo resuelto y sin combustible: lista para cerrarse
    Completing,
    /// Terminal
    Completed,
}

impl Assignment {
    pub fn new(
        dispatch_number: String,
        truck_id: Uuid,
        driver_id: Uuid,
        fuel_type: FuelType,
        total_loaded: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispatch_number,
            truck_id,
            driver_id,
            fuel_type,
            total_loaded,
            total_remaining: total_loaded,
            is_completed: false,
            completed_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn phase(&self, client_assignments: &[ClientAssignment]) -> AssignmentPhase {
        if self.is_completed {
            return AssignmentPhase::Completed;
        }
        let all_resolved = client_assignments.iter().all(|ca| ca.status.is_resolved());
        if all_resolved && self.total_remaining <= Decimal::ZERO {
            AssignmentPhase::Completing
        } else {
            AssignmentPhase::Open
        }
    }

    /// Una asignación es "stale" cuando sigue abierta después del umbral
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        !self.is_completed && now - self.created_at > stale_after
    }
}

/// Clientes con entregas sin resolver dentro de una asignación
pub fn unresolved_customers(client_assignments: &[ClientAssignment]) -> Vec<Uuid> {
    client_assignments
        .iter()
        .filter(|ca| ca.status == ClientAssignmentStatus::Pending)
        .map(|ca| ca.customer_id)
        .collect()
}
