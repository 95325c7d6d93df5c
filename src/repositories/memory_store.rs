//! Almacén en memoria
//!
//! Una transacción mantiene el mutex global durante toda su vida y trabaja
//! sobre una copia del estado; `commit` la publica. Todas las transacciones
//! quedan serializadas.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::fuel_store::FuelStore;
use crate::models::{
    Assignment, AssignmentNoteRecord, ClientAssignment, Discharge, DischargeStatus, Driver, Truck,
    TruckState,
};
use crate::utils::errors::{not_found_error, AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    trucks: HashMap<Uuid, Truck>,
    drivers: HashMap<Uuid, Driver>,
    assignments: HashMap<Uuid, Assignment>,
    client_assignments: Vec<ClientAssignment>,
    discharges: Vec<Discharge>,
    counters: HashMap<(String, i32), i64>,
    notes: Vec<AssignmentNoteRecord>,
}

impl MemoryState {
    fn assignment_mut(&mut self, id: Uuid) -> AppResult<&mut Assignment> {
        self.assignments
            .get_mut(&id)
            .ok_or_else(|| not_found_error("Assignment", &id))
    }

    fn truck_mut(&mut self, id: Uuid) -> AppResult<&mut Truck> {
        self.trucks
            .get_mut(&id)
            .ok_or_else(|| not_found_error("Truck", &id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryFuelStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFuelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl FuelStore for MemoryFuelStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }

    async fn commit(&self, tx: MemoryTx) -> AppResult<()> {
        let MemoryTx { mut guard, work } = tx;
        *guard = work;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> AppResult<()> {
        drop(tx);
        Ok(())
    }

    async fn insert_truck(&self, tx: &mut MemoryTx, truck: &Truck) -> AppResult<()> {
        if tx.work.trucks.values().any(|t| t.plate == truck.plate) {
            return Err(AppError::Conflict(format!("La placa {} ya está registrada", truck.plate)));
        }
        tx.work.trucks.insert(truck.id, truck.clone());
        Ok(())
    }

    async fn get_truck(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<Option<Truck>> {
        Ok(tx.work.trucks.get(&id).cloned())
    }

    async fn plate_exists(&self, tx: &mut MemoryTx, plate: &str) -> AppResult<bool> {
        Ok(tx.work.trucks.values().any(|t| t.plate == plate))
    }

    async fn list_trucks(&self, tx: &mut MemoryTx) -> AppResult<Vec<Truck>> {
        let mut trucks: Vec<Truck> = tx.work.trucks.values().cloned().collect();
        trucks.sort_by(|a, b| a.plate.cmp(&b.plate));
        Ok(trucks)
    }

    async fn update_truck_load(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        last_remaining: Decimal,
        state: TruckState,
    ) -> AppResult<()> {
        let truck = tx.work.truck_mut(id)?;
        truck.last_remaining = last_remaining;
        truck.state = state;
        truck.updated_at = Utc::now();
        Ok(())
    }

    async fn set_truck_state(&self, tx: &mut MemoryTx, id: Uuid, state: TruckState) -> AppResult<()> {
        let truck = tx.work.truck_mut(id)?;
        truck.state = state;
        truck.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_driver(&self, tx: &mut MemoryTx, driver: &Driver) -> AppResult<()> {
        tx.work.drivers.insert(driver.id, driver.clone());
        Ok(())
    }

    async fn get_driver(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<Option<Driver>> {
        Ok(tx.work.drivers.get(&id).cloned())
    }

    async fn insert_assignment(&self, tx: &mut MemoryTx, assignment: &Assignment) -> AppResult<()> {
        let truck_busy = tx
            .work
            .assignments
            .values()
            .any(|a| a.truck_id == assignment.truck_id && !a.is_completed);
        if truck_busy {
            return Err(AppError::Conflict(
                "El camión ya tiene una asignación abierta".to_string(),
            ));
        }
        tx.work.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn get_assignment(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<Option<Assignment>> {
        Ok(tx.work.assignments.get(&id).cloned())
    }

    async fn open_assignment_for_truck(
        &self,
        tx: &mut MemoryTx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        Ok(tx
            .work
            .assignments
            .values()
            .filter(|a| a.truck_id == truck_id && !a.is_completed)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn latest_assignment_for_truck(
        &self,
        tx: &mut MemoryTx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        Ok(tx
            .work
            .assignments
            .values()
            .filter(|a| a.truck_id == truck_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn list_open_assignments_created_before(
        &self,
        tx: &mut MemoryTx,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<Assignment>> {
        let mut stale: Vec<Assignment> = tx
            .work
            .assignments
            .values()
            .filter(|a| !a.is_completed && a.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|a| a.created_at);
        Ok(stale)
    }

    async fn try_decrement_remaining(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        amount: Decimal,
    ) -> AppResult<Option<Decimal>> {
        let assignment = tx.work.assignment_mut(id)?;
        if assignment.is_completed || assignment.total_remaining < amount {
            return Ok(None);
        }
        assignment.total_remaining -= amount;
        assignment.updated_at = Utc::now();
        Ok(Some(assignment.total_remaining))
    }

    async fn restore_remaining(&self, tx: &mut MemoryTx, id: Uuid, amount: Decimal) -> AppResult<Decimal> {
        let assignment = tx.work.assignment_mut(id)?;
        assignment.total_remaining = (assignment.total_remaining + amount).min(assignment.total_loaded);
        assignment.updated_at = Utc::now();
        Ok(assignment.total_remaining)
    }

    async fn set_assignment_completion(
        &self,
        tx: &mut MemoryTx,
        id: Uuid,
        completed_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        if completed_at.is_none() {
            let truck_id = tx.work.assignment_mut(id)?.truck_id;
            let truck_busy = tx
                .work
                .assignments
                .values()
                .any(|a| a.truck_id == truck_id && a.id != id && !a.is_completed);
            if truck_busy {
                return Err(AppError::Conflict(
                    "El camión ya tiene una asignación abierta".to_string(),
                ));
            }
        }
        let assignment = tx.work.assignment_mut(id)?;
        assignment.is_completed = completed_at.is_some();
        assignment.completed_at = completed_at;
        assignment.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_client_assignment(&self, tx: &mut MemoryTx, ca: &ClientAssignment) -> AppResult<()> {
        let duplicate = tx
            .work
            .client_assignments
            .iter()
            .any(|c| c.assignment_id == ca.assignment_id && c.customer_id == ca.customer_id);
        if duplicate {
            return Err(AppError::DuplicateAllocation {
                assignment_id: ca.assignment_id,
                customer_id: ca.customer_id,
            });
        }
        tx.work.client_assignments.push(ca.clone());
        Ok(())
    }

    async fn list_client_assignments(
        &self,
        tx: &mut MemoryTx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<ClientAssignment>> {
        Ok(tx
            .work
            .client_assignments
            .iter()
            .filter(|c| c.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn update_client_assignment(&self, tx: &mut MemoryTx, ca: &ClientAssignment) -> AppResult<()> {
        let slot = tx
            .work
            .client_assignments
            .iter_mut()
            .find(|c| c.id == ca.id)
            .ok_or_else(|| not_found_error("ClientAssignment", &ca.id))?;
        *slot = ca.clone();
        Ok(())
    }

    async fn insert_discharge(&self, tx: &mut MemoryTx, discharge: &Discharge) -> AppResult<()> {
        if tx.work.discharges.iter().any(|d| d.vale_number == discharge.vale_number) {
            return Err(AppError::ConcurrencyConflict(format!(
                "Número de vale duplicado: {}",
                discharge.vale_number
            )));
        }
        tx.work.discharges.push(discharge.clone());
        Ok(())
    }

    async fn get_discharge(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<Option<Discharge>> {
        Ok(tx.work.discharges.iter().find(|d| d.id == id).cloned())
    }

    async fn list_discharges(&self, tx: &mut MemoryTx, assignment_id: Uuid) -> AppResult<Vec<Discharge>> {
        Ok(tx
            .work
            .discharges
            .iter()
            .filter(|d| d.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn update_discharge(&self, tx: &mut MemoryTx, discharge: &Discharge) -> AppResult<()> {
        let slot = tx
            .work
            .discharges
            .iter_mut()
            .find(|d| d.id == discharge.id)
            .ok_or_else(|| not_found_error("Discharge", &discharge.id))?;
        *slot = discharge.clone();
        Ok(())
    }

    async fn delete_discharge(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<()> {
        let before = tx.work.discharges.len();
        tx.work.discharges.retain(|d| d.id != id);
        if tx.work.discharges.len() == before {
            return Err(not_found_error("Discharge", &id));
        }
        Ok(())
    }

    async fn finalize_discharges(&self, tx: &mut MemoryTx, assignment_id: Uuid) -> AppResult<u64> {
        let now = Utc::now();
        let mut finalized = 0;
        for discharge in tx
            .work
            .discharges
            .iter_mut()
            .filter(|d| d.assignment_id == assignment_id && d.status == DischargeStatus::Pending)
        {
            discharge.status = DischargeStatus::Finalized;
            discharge.updated_at = now;
            finalized += 1;
        }
        Ok(finalized)
    }

    async fn next_counter(&self, tx: &mut MemoryTx, prefix: &str, year: i32) -> AppResult<i64> {
        let counter = tx.work.counters.entry((prefix.to_string(), year)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_note(&self, tx: &mut MemoryTx, note: &AssignmentNoteRecord) -> AppResult<()> {
        tx.work.notes.push(note.clone());
        Ok(())
    }

    async fn list_notes(
        &self,
        tx: &mut MemoryTx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<AssignmentNoteRecord>> {
        Ok(tx
            .work
            .notes
            .iter()
            .filter(|n| n.assignment_id == assignment_id)
            .cloned()
            .collect())
    }
}
