//! Notas tipadas de una asignación
//!
//! Metadatos de viaje, documentación por etapa y detalle de entregas.
//! Cada variante se persiste en su propia tabla.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

/// Etapa del despacho documentada por el conductor - mapea al ENUM dispatch_stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "dispatch_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Loading,
    InTransit,
    Unloading,
    Closing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripInfo {
    pub origin: String,
    pub destination: String,
    pub departed_at: Option<DateTime<Utc>>,
    pub odometer_start: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageDocumentation {
    pub stage: DispatchStage,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryDetail {
    pub customer_id: Uuid,
    pub discharge_id: Option<Uuid>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignmentNote {
    Trip(TripInfo),
    Stage(StageDocumentation),
    Delivery(DeliveryDetail),
}

/// Nota ya persistida
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentNoteRecord {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub note: AssignmentNote,
}

impl AssignmentNoteRecord {
    pub fn new(assignment_id: Uuid, note: AssignmentNote) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignment_id,
            recorded_at: Utc::now(),
            note,
        }
    }
}
