use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AssignmentNote, FuelType, MeterReadings, TruckState};
use crate::services::numbering_service::IdentifierPrefix;
use crate::utils::validation::{validate_non_negative_decimal, validate_plate, validate_positive_decimal};

// Response genérica
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

// Request para registrar un camión
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTruckRequest {
    #[validate(custom = "validate_plate")]
    pub plate: String,
    pub fuel_type: FuelType,
    #[validate(custom = "validate_positive_decimal")]
    pub capacity: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative_decimal")]
    pub last_remaining: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTruckStateRequest {
    pub state: TruckState,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDriverRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    pub truck_id: Uuid,
    pub driver_id: Uuid,
    #[validate(custom = "validate_positive_decimal")]
    pub total_loaded: Decimal,
    #[serde(default)]
    pub notes: Vec<AssignmentNote>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AllocateFuelRequest {
    pub customer_id: Uuid,
    #[validate(custom = "validate_positive_decimal")]
    pub allocated_quantity: Decimal,
}

// Las cantidades de descarga las valida el libro de combustible
#[derive(Debug, Deserialize)]
pub struct RecordDischargeRequest {
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub meter_readings: Option<MeterReadings>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectDischargeRequest {
    pub amount: Decimal,
    pub meter_readings: Option<MeterReadings>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteAssignmentRequest {
    #[serde(default, rename = "override")]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct NextNumberRequest {
    #[serde(default = "default_prefix")]
    pub prefix: IdentifierPrefix,
}

fn default_prefix() -> IdentifierPrefix {
    IdentifierPrefix::Vale
}

#[derive(Debug, Serialize)]
pub struct NumberResponse {
    pub number: String,
}
