//! Colaborador de persistencia
//!
//! `FuelStore` expone lectura/escritura transaccional de camiones,
//! asignaciones, asignaciones a cliente, descargas y notas, más un contador
//! atómico por (prefijo, año).
//!
//! ## Transacciones
//!
//! Toda operación recibe `&mut Self::Tx`:
//!
//! 1. `begin()` abre la transacción
//! 2. lecturas y escrituras con `&mut tx`
//! 3. `commit(tx)` o `rollback(tx)` la consumen
//!
//! Una `Tx` que se descarta sin `commit` se revierte.
//!
//! Las lecturas de filas mutables (`get_assignment`, `get_truck`, ...) bloquean
//! la fila hasta el fin de la transacción.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    Assignment, AssignmentNoteRecord, ClientAssignment, Discharge, Driver, Truck, TruckState,
};
use crate::utils::errors::AppResult;

#[async_trait]
pub trait FuelStore: Send + Sync + 'static {
    type Tx: Send;

    // ── Ciclo de vida de la transacción ───────────────────────────────────────

    async fn begin(&self) -> AppResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> AppResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> AppResult<()>;

    // ── Camiones y conductores ────────────────────────────────────────────────

    async fn insert_truck(&self, tx: &mut Self::Tx, truck: &Truck) -> AppResult<()>;

    async fn get_truck(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Option<Truck>>;

    async fn plate_exists(&self, tx: &mut Self::Tx, plate: &str) -> AppResult<bool>;

    async fn list_trucks(&self, tx: &mut Self::Tx) -> AppResult<Vec<Truck>>;

    /// Fija el combustible a bordo y el estado en una sola escritura
    async fn update_truck_load(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        last_remaining: Decimal,
        state: TruckState,
    ) -> AppResult<()>;

    async fn set_truck_state(&self, tx: &mut Self::Tx, id: Uuid, state: TruckState) -> AppResult<()>;

    async fn insert_driver(&self, tx: &mut Self::Tx, driver: &Driver) -> AppResult<()>;

    async fn get_driver(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Option<Driver>>;

    // ── Asignaciones ──────────────────────────────────────────────────────────

    /// Falla con `Conflict` si el camión ya tiene una asignación abierta
    async fn insert_assignment(&self, tx: &mut Self::Tx, assignment: &Assignment) -> AppResult<()>;

    async fn get_assignment(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Option<Assignment>>;

    async fn open_assignment_for_truck(
        &self,
        tx: &mut Self::Tx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>>;

    async fn latest_assignment_for_truck(
        &self,
        tx: &mut Self::Tx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>>;

    async fn list_open_assignments_created_before(
        &self,
        tx: &mut Self::Tx,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<Assignment>>;

    /// Decrementa `total_remaining` en `amount` solo si la asignación sigue
    /// abierta y `total_remaining >= amount`, comprobado y aplicado en una
    /// sola operación. Devuelve el nuevo saldo o `None` si la condición falló.
    async fn try_decrement_remaining(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        amount: Decimal,
    ) -> AppResult<Option<Decimal>>;

    /// Devuelve `amount` al saldo sin superar `total_loaded`
    async fn restore_remaining(&self, tx: &mut Self::Tx, id: Uuid, amount: Decimal) -> AppResult<Decimal>;

    /// `Some(at)` completa la asignación, `None` la reabre
    async fn set_assignment_completion(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
        completed_at: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    // ── Asignaciones a cliente ────────────────────────────────────────────────

    async fn insert_client_assignment(&self, tx: &mut Self::Tx, ca: &ClientAssignment) -> AppResult<()>;

    async fn list_client_assignments(
        &self,
        tx: &mut Self::Tx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<ClientAssignment>>;

    async fn update_client_assignment(&self, tx: &mut Self::Tx, ca: &ClientAssignment) -> AppResult<()>;

    // ── Descargas ─────────────────────────────────────────────────────────────

    async fn insert_discharge(&self, tx: &mut Self::Tx, discharge: &Discharge) -> AppResult<()>;

    async fn get_discharge(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Option<Discharge>>;

    async fn list_discharges(&self, tx: &mut Self::Tx, assignment_id: Uuid) -> AppResult<Vec<Discharge>>;

    async fn update_discharge(&self, tx: &mut Self::Tx, discharge: &Discharge) -> AppResult<()>;

    async fn delete_discharge(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<()>;

    /// Pasa a `finalized` toda descarga pendiente de la asignación
    async fn finalize_discharges(&self, tx: &mut Self::Tx, assignment_id: Uuid) -> AppResult<u64>;

    // ── Contadores ────────────────────────────────────────────────────────────

    /// Incremento atómico del contador (prefijo, año); devuelve el nuevo valor
    async fn next_counter(&self, tx: &mut Self::Tx, prefix: &str, year: i32) -> AppResult<i64>;

    // ── Notas ─────────────────────────────────────────────────────────────────

    async fn insert_note(&self, tx: &mut Self::Tx, note: &AssignmentNoteRecord) -> AppResult<()>;

    async fn list_notes(
        &self,
        tx: &mut Self::Tx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<AssignmentNoteRecord>>;
}
