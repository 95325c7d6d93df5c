//! Roles y capacidades
//!
//! El colaborador de autenticación entrega un `Caller` ya resuelto. Las
//! capacidades se derivan del rol en un solo lugar y los servicios las
//! consultan en su frontera.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::assignment::Assignment;

/// Roles del sistema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Conductor
    Operator,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Operator => "operator",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator" => Ok(UserRole::Operator),
            "admin" => Ok(UserRole::Admin),
            "super_admin" | "s_a" => Ok(UserRole::SuperAdmin),
            other => Err(format!("Rol desconocido: {}", other)),
        }
    }
}

/// Identidad resuelta de quien invoca una operación del motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    /// Identidad de los barridos programados desde el propio servidor
    pub fn system() -> Self {
        Self::new(Uuid::nil(), UserRole::SuperAdmin)
    }

    /// Admin y super admin siempre; un operador solo sobre su propia asignación
    pub fn can_record_discharge(&self, assignment: &Assignment) -> bool {
        self.role.is_admin() || assignment.driver_id == self.user_id
    }

    pub fn can_view_assignment(&self, assignment: &Assignment) -> bool {
        self.can_record_discharge(assignment)
    }

    pub fn can_allocate(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_complete_assignment(&self, assignment: &Assignment) -> bool {
        self.role.is_admin() || assignment.driver_id == self.user_id
    }

    pub fn can_override_state(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_correct_discharges(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_run_sweeps(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_manage_fleet(&self) -> bool {
        self.role.is_admin()
    }
}

/// Claims del JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // user_id
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::truck::FuelType;
    use rust_decimal::Decimal;

    fn assignment_for(driver_id: Uuid) -> Assignment {
        Assignment::new(
            "PETRUS-000001-2025".to_string(),
            Uuid::new_v4(),
            driver_id,
            FuelType::DieselB5,
            Decimal::from(100),
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_operator_only_records_on_own_assignment() {
        let driver = Caller::new(Uuid::new_v4(), UserRole::Operator);
        let other = Caller::new(Uuid::new_v4(), UserRole::Operator);
        let assignment = assignment_for(driver.user_id);

        assert!(driver.can_record_discharge(&assignment));
        assert!(!other.can_record_discharge(&assignment));
        assert!(!driver.can_override_state());
        assert!(!driver.can_allocate());
    }

    #[test]
    fn test_admin_capabilities() {
        let admin = Caller::new(Uuid::new_v4(), UserRole::Admin);
        let assignment = assignment_for(Uuid::new_v4());
        assert!(admin.can_record_discharge(&assignment));
        assert!(admin.can_override_state());
        assert!(admin.can_run_sweeps());
        assert_eq!("s_a".parse::<UserRole>(), Ok(UserRole::SuperAdmin));
        assert!("driver".parse::<UserRole>().is_err());
    }
}
