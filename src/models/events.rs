//! Eventos de dominio
//!
//! Se publican después de confirmar la transacción que los produjo. El
//! historial/auditoría se suscribe a ellos; el motor no escribe auditoría.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::truck::TruckState;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AssignmentCreated {
        assignment_id: Uuid,
        truck_id: Uuid,
        driver_id: Uuid,
        dispatch_number: String,
        total_loaded: Decimal,
    },
    AllocationCreated {
        assignment_id: Uuid,
        customer_id: Uuid,
        allocated_quantity: Decimal,
    },
    DischargeRecorded {
        discharge_id: Uuid,
        assignment_id: Uuid,
        customer_id: Uuid,
        vale_number: String,
        amount: Decimal,
        remaining: Decimal,
    },
    DischargeCorrected {
        discharge_id: Uuid,
        assignment_id: Uuid,
        previous_amount: Decimal,
        amount: Decimal,
    },
    DischargeDeleted {
        discharge_id: Uuid,
        assignment_id: Uuid,
        restored: Decimal,
    },
    MeterDiscrepancy {
        discharge_id: Uuid,
        declared: Decimal,
        computed: Decimal,
        delta: Decimal,
    },
    ClientAssignmentExpired {
        assignment_id: Uuid,
        customer_id: Uuid,
    },
    AssignmentCompleted {
        assignment_id: Uuid,
        truck_id: Uuid,
        #[serde(rename = "override")]
        forced: bool,
        completed_at: DateTime<Utc>,
    },
    AssignmentReopened {
        assignment_id: Uuid,
        truck_id: Uuid,
    },
    TruckStateChanged {
        truck_id: Uuid,
        from: TruckState,
        to: TruckState,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AssignmentCreated { .. } => "assignment_created",
            DomainEvent::AllocationCreated { .. } => "allocation_created",
            DomainEvent::DischargeRecorded { .. } => "discharge_recorded",
            DomainEvent::DischargeCorrected { .. } => "discharge_corrected",
            DomainEvent::DischargeDeleted { .. } => "discharge_deleted",
            DomainEvent::MeterDiscrepancy { .. } => "meter_discrepancy",
            DomainEvent::ClientAssignmentExpired { .. } => "client_assignment_expired",
            DomainEvent::AssignmentCompleted { .. } => "assignment_completed",
            DomainEvent::AssignmentReopened { .. } => "assignment_reopened",
            DomainEvent::TruckStateChanged { .. } => "truck_state_changed",
        }
    }
}
