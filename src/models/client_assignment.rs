//! Modelo de ClientAssignment
//!
//! Asignación planificada de parte de la carga a un cliente.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado de la asignación a cliente - mapea al ENUM client_assignment_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "client_assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientAssignmentStatus {
    Pending,
    Completed,
    Expired,
}

impl ClientAssignmentStatus {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ClientAssignmentStatus::Completed | ClientAssignmentStatus::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ClientAssignment {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub customer_id: Uuid,
    pub allocated_quantity: Decimal,
    pub delivered_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub status: ClientAssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ClientAssignment {
    pub fn new(assignment_id: Uuid, customer_id: Uuid, allocated_quantity: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            customer_id,
            allocated_quantity,
            delivered_quantity: Decimal::ZERO,
            remaining_quantity: allocated_quantity,
            status: ClientAssignmentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Registra `amount` como entregado. Pasa a `Completed` cuando no queda nada.
    pub fn apply_delivery(&mut self, amount: Decimal, now: DateTime<Utc>) {
        self.delivered_quantity += amount;
        self.remaining_quantity = self.allocated_quantity - self.delivered_quantity;
        if self.remaining_quantity <= Decimal::ZERO {
            self.status = ClientAssignmentStatus::Completed;
            self.completed_at = Some(now);
        }
    }

    /// Revierte una entrega previa (corrección o borrado de descarga)
    pub fn revert_delivery(&mut self, amount: Decimal) {
        self.delivered_quantity = (self.delivered_quantity - amount).max(Decimal::ZERO);
        self.remaining_quantity = self.allocated_quantity - self.delivered_quantity;
        if self.status == ClientAssignmentStatus::Completed && self.remaining_quantity > Decimal::ZERO {
            self.status = ClientAssignmentStatus::Pending;
            self.completed_at = None;
        }
    }

    /// Expiración forzada por el barrido: entregado y restante quedan en cero
    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.delivered_quantity = Decimal::ZERO;
        self.remaining_quantity = Decimal::ZERO;
        self.status = ClientAssignmentStatus::Expired;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_then_full_delivery() {
        let mut ca = ClientAssignment::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::from(200));
        ca.apply_delivery(Decimal::from(150), Utc::now());
        assert_eq!(ca.remaining_quantity, Decimal::from(50));
        assert_eq!(ca.status, ClientAssignmentStatus::Pending);

        ca.apply_delivery(Decimal::from(50), Utc::now());
        assert_eq!(ca.remaining_quantity, Decimal::ZERO);
        assert_eq!(ca.status, ClientAssignmentStatus::Completed);
    }

    #[test]
    fn test_revert_reopens_completed_allocation() {
        let mut ca = ClientAssignment::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::from(100));
        ca.apply_delivery(Decimal::from(100), Utc::now());
        ca.revert_delivery(Decimal::from(40));
        assert_eq!(ca.delivered_quantity, Decimal::from(60));
        assert_eq!(ca.remaining_quantity, Decimal::from(40));
        assert_eq!(ca.status, ClientAssignmentStatus::Pending);
        assert!(ca.completed_at.is_none());
    }
}
