//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y los parámetros del
//! motor de despacho.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;

use crate::services::fuel_ledger::DEFAULT_METER_TOLERANCE;

/// Backend de persistencia
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!("STORAGE_BACKEND desconocido: '{}'", other)),
        }
    }
}

/// Parámetros que ven los servicios del motor
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Antigüedad a partir de la cual una asignación abierta se auto-completa
    pub stale_after: chrono::Duration,
    /// Tolerancia relativa del cruce con el marcador
    pub meter_tolerance_ratio: Decimal,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            stale_after: chrono::Duration::hours(24),
            meter_tolerance_ratio: DEFAULT_METER_TOLERANCE,
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub storage_backend: StorageBackend,
    pub sweep_interval_secs: Option<u64>,
    pub dispatch: DispatchSettings,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self> {
        let stale_hours: i64 = var_or("STALE_ASSIGNMENT_HOURS", "24")
            .parse()
            .context("STALE_ASSIGNMENT_HOURS must be a valid number")?;
        if stale_hours <= 0 {
            return Err(anyhow!("STALE_ASSIGNMENT_HOURS must be positive"));
        }

        let meter_tolerance_ratio = Decimal::from_str(&var_or("METER_TOLERANCE_RATIO", "0.02"))
            .context("METER_TOLERANCE_RATIO must be a decimal")?;
        if meter_tolerance_ratio < Decimal::ZERO {
            return Err(anyhow!("METER_TOLERANCE_RATIO must not be negative"));
        }

        let sweep_interval_secs = match env::var("SWEEP_INTERVAL_SECS") {
            Ok(raw) => Some(
                raw.parse()
                    .context("SWEEP_INTERVAL_SECS must be a valid number")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            environment: var_or("ENVIRONMENT", "development"),
            port: var_or("PORT", "3000")
                .parse()
                .context("PORT must be a valid number")?,
            host: var_or("HOST", "0.0.0.0"),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            cors_origins: var_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            storage_backend: var_or("STORAGE_BACKEND", "postgres").parse()?,
            sweep_interval_secs,
            dispatch: DispatchSettings {
                stale_after: chrono::Duration::hours(stale_hours),
                meter_tolerance_ratio,
            },
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
