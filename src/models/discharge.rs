//! Modelo de Discharge (vale de descarga)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado de la descarga - mapea al ENUM discharge_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "discharge_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DischargeStatus {
    Pending,
    Finalized,
}

/// Lecturas del marcador del camión antes y después de descargar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MeterReadings {
    pub marcador_inicial: Decimal,
    pub marcador_final: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Discharge {
    pub id: Uuid,
    pub vale_number: String,
    pub assignment_id: Uuid,
    pub customer_id: Uuid,
    /// Asignación a cliente contra la que se contó la entrega; `None` si no
    /// era una entrega planificada
    pub client_assignment_id: Option<Uuid>,
    pub total_discharged: Decimal,
    pub status: DischargeStatus,
    pub marcador_inicial: Option<Decimal>,
    pub marcador_final: Option<Decimal>,
    pub cantidad_real: Option<Decimal>,
    pub meter_flagged: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Discharge {
    pub fn new(
        vale_number: String,
        assignment_id: Uuid,
        customer_id: Uuid,
        total_discharged: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vale_number,
            assignment_id,
            customer_id,
            client_assignment_id: None,
            total_discharged,
            status: DischargeStatus::Pending,
            marcador_inicial: None,
            marcador_final: None,
            cantidad_real: None,
            meter_flagged: false,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn meter_readings(&self) -> Option<MeterReadings> {
        match (self.marcador_inicial, self.marcador_final) {
            (Some(marcador_inicial), Some(marcador_final)) => Some(MeterReadings {
                marcador_inicial,
                marcador_final,
            }),
            _ => None,
        }
    }
}
