//! Utilidades de validación
//!
//! Validadores personalizados para los DTOs de entrada.

use rust_decimal::Decimal;
use validator::ValidationError;

/// Validar que una cantidad en galones sea estrictamente positiva
pub fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut error = ValidationError::new("positive");
        error.add_param("actual".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar que una cantidad no sea negativa
pub fn validate_non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut error = ValidationError::new("non_negative");
        error.add_param("actual".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar formato de placa: letras, dígitos y guiones
pub fn validate_plate(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let well_formed = !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !well_formed {
        let mut error = ValidationError::new("plate");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_decimal() {
        assert!(validate_positive_decimal(&Decimal::new(1, 2)).is_ok());
        assert!(validate_positive_decimal(&Decimal::ZERO).is_err());
        assert!(validate_non_negative_decimal(&Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_validate_plate() {
        assert!(validate_plate("ABC-123").is_ok());
        assert!(validate_plate("AB C").is_err());
        assert!(validate_plate("").is_err());
    }
}
