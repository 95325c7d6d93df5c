//! NumberingService
//!
//! Identificadores legibles `PREFIJO-NNNNNN-AAAA` (vales y despachos). La
//! secuencia sale de un contador durable por (prefijo, año) que el almacén
//! incrementa atómicamente; nunca se deriva del máximo existente.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::repositories::FuelStore;
use crate::utils::errors::{AppError, AppResult};

/// Mayor secuencia representable con 6 dígitos
pub const MAX_SEQUENCE: i64 = 999_999;

lazy_static! {
    static ref IDENTIFIER_RE: Regex =
        Regex::new(r"^(PE|PETRUS)-(\d{6})-(\d{4})$").expect("identifier regex is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierPrefix {
    /// Vale de descarga
    #[serde(rename = "PE")]
    Vale,
    /// Número de despacho de una asignación
    #[serde(rename = "PETRUS")]
    Dispatch,
}

impl IdentifierPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierPrefix::Vale => "PE",
            IdentifierPrefix::Dispatch => "PETRUS",
        }
    }
}

impl FromStr for IdentifierPrefix {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PE" => Ok(IdentifierPrefix::Vale),
            "PETRUS" => Ok(IdentifierPrefix::Dispatch),
            other => Err(AppError::BadRequest(format!("Prefijo desconocido: {}", other))),
        }
    }
}

impl fmt::Display for IdentifierPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParsedIdentifier {
    pub prefix: IdentifierPrefix,
    pub sequence: u32,
    pub year: i32,
}

pub fn format_identifier(prefix: IdentifierPrefix, sequence: i64, year: i32) -> AppResult<String> {
    if !(1..=MAX_SEQUENCE).contains(&sequence) || !(0..=9999).contains(&year) {
        return Err(AppError::NumberingExhausted {
            prefix: prefix.as_str().to_string(),
            year,
        });
    }
    Ok(format!("{}-{:06}-{:04}", prefix.as_str(), sequence, year))
}

pub fn parse(id: &str) -> Option<ParsedIdentifier> {
    let caps = IDENTIFIER_RE.captures(id)?;
    Some(ParsedIdentifier {
        prefix: caps.get(1)?.as_str().parse().ok()?,
        sequence: caps.get(2)?.as_str().parse().ok()?,
        year: caps.get(3)?.as_str().parse().ok()?,
    })
}

pub fn is_valid(id: &str) -> bool {
    IDENTIFIER_RE.is_match(id)
}

pub struct NumberingService<S: FuelStore> {
    store: Arc<S>,
}

impl<S: FuelStore> Clone for NumberingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: FuelStore> NumberingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Siguiente identificador en su propia transacción
    pub async fn next(&self, prefix: IdentifierPrefix, year: i32) -> AppResult<String> {
        let mut tx = self.store.begin().await?;
        let id = self.next_in(&mut tx, prefix, year).await?;
        self.store.commit(tx).await?;
        Ok(id)
    }

    /// Siguiente identificador dentro de una transacción ya abierta: si la
    /// transacción se revierte, el número no se consume.
    pub async fn next_in(
        &self,
        tx: &mut S::Tx,
        prefix: IdentifierPrefix,
        year: i32,
    ) -> AppResult<String> {
        let sequence = self.store.next_counter(tx, prefix.as_str(), year).await?;
        match format_identifier(prefix, sequence, year) {
            Ok(id) => {
                debug!("🔢 Número asignado: {}", id);
                Ok(id)
            }
            Err(e) => {
                error!("❌ Numeración agotada para {} en {}", prefix, year);
                Err(e)
            }
        }
    }
}
