//! Configuración de base de datos
//!
//! Pool de PostgreSQL del almacén del motor. Las transacciones de descarga
//! retienen filas con `FOR UPDATE`, así que el tamaño del pool y la espera
//! por una conexión son configurables.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Espera máxima por una conexión libre antes de fallar la operación
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |name: &str, default: u64| -> Result<u64> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} debe ser un entero", name)),
                None => Ok(default),
            }
        };

        let max_connections = number("DATABASE_MAX_CONNECTIONS", 20)? as u32;
        let min_connections = number("DATABASE_MIN_CONNECTIONS", 2)? as u32;
        if max_connections == 0 || min_connections > max_connections {
            return Err(anyhow!(
                "Pool inválido: min {} / max {}",
                min_connections,
                max_connections
            ));
        }

        Ok(Self {
            url: lookup("DATABASE_URL").context("DATABASE_URL must be set in environment variables")?,
            max_connections,
            min_connections,
            acquire_timeout: Duration::from_secs(number("DATABASE_ACQUIRE_TIMEOUT_SECS", 10)?),
        })
    }

    pub async fn create_pool(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DatabaseConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_and_overrides() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/fuel")]).unwrap();
        assert_eq!(cfg.max_connections, 20);
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(10));

        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/fuel"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("DATABASE_ACQUIRE_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(cfg.max_connections, 4);
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_missing_url_and_bad_pool() {
        assert!(config(&[]).is_err());
        assert!(config(&[
            ("DATABASE_URL", "postgres://localhost/fuel"),
            ("DATABASE_MIN_CONNECTIONS", "8"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .is_err());
        assert!(config(&[
            ("DATABASE_URL", "postgres://localhost/fuel"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ])
        .is_err());
    }
}
