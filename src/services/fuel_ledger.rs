//! FuelLedger
//!
//! Aritmética pura sobre cantidades de combustible. Sin estado, sin I/O y sin
//! pánicos: toda violación vuelve como `LedgerError` con el contexto numérico
//! para que el operador pueda corregir la entrada.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Tolerancia por defecto del cruce con el marcador (2%)
pub const DEFAULT_METER_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("quantity must be greater than zero, got {requested}")]
    InvalidQuantity { requested: Decimal },

    #[error("requested {requested} exceeds available {available}")]
    InsufficientFuel { requested: Decimal, available: Decimal },

    #[error("allocation {requested} on top of {allocated} exceeds loaded {total_loaded}")]
    CapacityExceeded {
        requested: Decimal,
        allocated: Decimal,
        total_loaded: Decimal,
    },
}

/// Resultado consultivo del cruce con el marcador
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeterCheck {
    pub within_tolerance: bool,
    pub computed: Decimal,
    pub delta: Decimal,
    pub tolerance: Decimal,
}

/// Valida una descarga contra el saldo y devuelve el nuevo saldo
pub fn validate_discharge(remaining: Decimal, requested: Decimal) -> Result<Decimal, LedgerError> {
    if requested <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity { requested });
    }
    if requested > remaining {
        return Err(LedgerError::InsufficientFuel {
            requested,
            available: remaining.max(Decimal::ZERO),
        });
    }
    Ok(remaining - requested)
}

/// Valida que una nueva asignación a cliente quepa en la carga
pub fn validate_allocation(
    total_loaded: Decimal,
    existing_allocations: Decimal,
    new_allocation: Decimal,
) -> Result<(), LedgerError> {
    if new_allocation <= Decimal::ZERO {
        return Err(LedgerError::InvalidQuantity {
            requested: new_allocation,
        });
    }
    if existing_allocations + new_allocation > total_loaded {
        return Err(LedgerError::CapacityExceeded {
            requested: new_allocation,
            allocated: existing_allocations,
            total_loaded,
        });
    }
    Ok(())
}

/// Cruce de la cantidad declarada con el marcador del camión.
///
/// El marcador descuenta al despachar, así que la cantidad medida es
/// `marker_start - marker_end`. El límite es inclusivo: una diferencia igual a
/// la tolerancia pasa.
pub fn cross_check_meter_reading(
    declared: Decimal,
    marker_start: Decimal,
    marker_end: Decimal,
    tolerance_ratio: Decimal,
) -> MeterCheck {
    let computed = marker_start - marker_end;
    let delta = (computed - declared).abs();
    let tolerance = (declared * tolerance_ratio).abs();
    MeterCheck {
        within_tolerance: delta <= tolerance,
        computed,
        delta,
        tolerance,
    }
}

/// Saldo esperado: cargado menos todo lo descargado
pub fn expected_remaining<I>(total_loaded: Decimal, discharged: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    total_loaded - discharged.into_iter().sum::<Decimal>()
}

/// `total_loaded - Σ descargado == total_remaining`
pub fn is_conserved<I>(total_loaded: Decimal, discharged: I, total_remaining: Decimal) -> bool
where
    I: IntoIterator<Item = Decimal>,
{
    expected_remaining(total_loaded, discharged) == total_remaining
}
