//! Modelo de Truck
//!
//! Camión cisterna con su capacidad, el tipo de combustible que puede
//! transportar y el combustible que le queda a bordo (`last_remaining`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del camión - mapea al ENUM truck_state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "truck_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TruckState {
    Active,
    Inactive,
    Maintenance,
    InTransit,
    Unloading,
    Assigned,
}

impl TruckState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckState::Active => "active",
            TruckState::Inactive => "inactive",
            TruckState::Maintenance => "maintenance",
            TruckState::InTransit => "in_transit",
            TruckState::Unloading => "unloading",
            TruckState::Assigned => "assigned",
        }
    }
}

impl fmt::Display for TruckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tipo de combustible. `Custom` lleva el nombre libre que registró el admin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FuelType {
    DieselB5,
    Gasohol90,
    Gasohol95,
    Gasohol97,
    Glp,
    Custom(String),
}

const CUSTOM_PREFIX: &str = "custom:";

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuelType::DieselB5 => f.write_str("diesel_b5"),
            FuelType::Gasohol90 => f.write_str("gasohol_90"),
            FuelType::Gasohol95 => f.write_str("gasohol_95"),
            FuelType::Gasohol97 => f.write_str("gasohol_97"),
            FuelType::Glp => f.write_str("glp"),
            FuelType::Custom(name) => write!(f, "{}{}", CUSTOM_PREFIX, name),
        }
    }
}

impl FromStr for FuelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_lowercase().as_str() {
            "diesel_b5" => Ok(FuelType::DieselB5),
            "gasohol_90" => Ok(FuelType::Gasohol90),
            "gasohol_95" => Ok(FuelType::Gasohol95),
            "gasohol_97" => Ok(FuelType::Gasohol97),
            "glp" => Ok(FuelType::Glp),
            lower if lower.starts_with(CUSTOM_PREFIX) => {
                let name = value[CUSTOM_PREFIX.len()..].trim();
                if name.is_empty() {
                    Err("El combustible personalizado requiere un nombre".to_string())
                } else {
                    Ok(FuelType::Custom(name.to_string()))
                }
            }
            other => Err(format!("Tipo de combustible desconocido: '{}'", other)),
        }
    }
}

impl Serialize for FuelType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FuelType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Truck principal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Truck {
    pub id: Uuid,
    pub plate: String,
    pub fuel_type: FuelType,
    pub capacity: Decimal,
    pub last_remaining: Decimal,
    pub state: TruckState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Truck {
    pub fn new(plate: String, fuel_type: FuelType, capacity: Decimal, last_remaining: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plate,
            fuel_type,
            capacity,
            last_remaining,
            state: TruckState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// `0 ≤ last_remaining ≤ capacity`
    pub fn load_is_consistent(&self) -> bool {
        self.last_remaining >= Decimal::ZERO && self.last_remaining <= self.capacity
    }
}

/// Estado del conductor - mapea al ENUM driver_state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "driver_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Active,
    Inactive,
}

/// Conductor. El CRUD completo vive fuera del motor; aquí solo importa su estado.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub state: DriverState,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            state: DriverState::Active,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuel_type_custom_keeps_name() {
        let fuel: FuelType = "custom:Turbo Diesel".parse().unwrap();
        assert_eq!(fuel, FuelType::Custom("Turbo Diesel".to_string()));
        assert_eq!(fuel.to_string(), "custom:Turbo Diesel");
    }

    #[test]
    fn test_fuel_type_rejects_unknown_and_empty_custom() {
        assert!("kerosene".parse::<FuelType>().is_err());
        assert!("custom:  ".parse::<FuelType>().is_err());
        assert_eq!("DIESEL_B5".parse::<FuelType>().unwrap(), FuelType::DieselB5);
    }

    #[test]
    fn test_truck_load_consistency() {
        let mut truck = Truck::new("ABC-123".to_string(), FuelType::Glp, Decimal::from(5000), Decimal::ZERO);
        assert!(truck.load_is_consistent());
        truck.last_remaining = Decimal::from(5001);
        assert!(!truck.load_is_consistent());
    }
}
