//! ReconciliationService
//!
//! Único componente que modifica `Assignment.total_remaining`,
//! `Truck.last_remaining`/`state` y que crea descargas y asignaciones a
//! cliente. Cada operación con efectos sobre varias filas corre en una sola
//! transacción del `FuelStore`; los eventos se publican solo tras el commit.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::models::{
    Assignment, AssignmentNote, AssignmentNoteRecord, AssignmentPhase, Caller, ClientAssignment,
    ClientAssignmentStatus, Discharge, DomainEvent, Driver, DriverState, FuelType, MeterReadings,
    Truck, TruckState,
};
use crate::repositories::FuelStore;
use crate::services::assignment_state_machine::{
    AssignmentStateMachine, FleetRefreshReport, SweepReport,
};
use crate::services::event_publisher::EventPublisher;
use crate::services::fuel_ledger::{self, MeterCheck};
use crate::services::numbering_service::{IdentifierPrefix, NumberingService};
use crate::utils::errors::{forbidden_error, not_found_error, AppError, AppResult};

/// Datos de alta de un camión
#[derive(Debug, Clone)]
pub struct NewTruck {
    pub plate: String,
    pub fuel_type: FuelType,
    pub capacity: Decimal,
    pub last_remaining: Decimal,
}

/// Vista completa de una asignación con su chequeo de conservación
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentSummary {
    pub assignment: Assignment,
    pub phase: AssignmentPhase,
    pub client_assignments: Vec<ClientAssignment>,
    pub discharges: Vec<Discharge>,
    pub notes: Vec<AssignmentNoteRecord>,
    pub total_discharged: Decimal,
    pub expected_remaining: Decimal,
    pub balance_ok: bool,
}

/// Reintenta una vez una lectura idempotente si el almacén falló de forma transitoria
async fn retry_read<T, F, Fut>(operation: &str, mut read: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match read().await {
        Err(e) if e.is_transient() => {
            warn!("🔄 {} falló de forma transitoria, reintentando: {}", operation, e);
            read().await
        }
        other => other,
    }
}

fn truck_state_for_load(remaining: Decimal) -> TruckState {
    if remaining > Decimal::ZERO {
        TruckState::Unloading
    } else {
        TruckState::Active
    }
}

pub struct ReconciliationService<S: FuelStore> {
    store: Arc<S>,
    numbering: NumberingService<S>,
    state_machine: AssignmentStateMachine<S>,
    events: EventPublisher,
    settings: DispatchSettings,
}

impl<S: FuelStore> Clone for ReconciliationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            numbering: self.numbering.clone(),
            state_machine: self.state_machine.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: FuelStore> ReconciliationService<S> {
    pub fn new(store: Arc<S>, events: EventPublisher, settings: DispatchSettings) -> Self {
        Self {
            numbering: NumberingService::new(store.clone()),
            state_machine: AssignmentStateMachine::new(store.clone(), events.clone(), settings.clone()),
            store,
            events,
            settings,
        }
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn numbering(&self) -> &NumberingService<S> {
        &self.numbering
    }

    pub fn state_machine(&self) -> &AssignmentStateMachine<S> {
        &self.state_machine
    }

    async fn load_assignment(&self, tx: &mut S::Tx, id: Uuid) -> AppResult<Assignment> {
        self.store
            .get_assignment(tx, id)
            .await?
            .ok_or_else(|| not_found_error("Assignment", &id))
    }

    async fn load_discharge(&self, tx: &mut S::Tx, id: Uuid) -> AppResult<Discharge> {
        self.store
            .get_discharge(tx, id)
            .await?
            .ok_or_else(|| not_found_error("Discharge", &id))
    }

    /// Fija carga y estado del camión, anotando el cambio de estado si lo hubo
    async fn set_truck_load(
        &self,
        tx: &mut S::Tx,
        truck_id: Uuid,
        remaining: Decimal,
        state: TruckState,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<()> {
        let truck = self
            .store
            .get_truck(tx, truck_id)
            .await?
            .ok_or_else(|| not_found_error("Truck", &truck_id))?;
        self.store.update_truck_load(tx, truck_id, remaining, state).await?;
        if truck.state != state {
            events.push(DomainEvent::TruckStateChanged {
                truck_id,
                from: truck.state,
                to: state,
            });
        }
        Ok(())
    }

    /// Aplica el cruce con el marcador sobre la descarga
    fn apply_meter_check(
        &self,
        discharge: &mut Discharge,
        readings: Option<MeterReadings>,
        events: &mut Vec<DomainEvent>,
    ) -> Option<MeterCheck> {
        let readings = readings.or_else(|| discharge.meter_readings())?;
        let check = fuel_ledger::cross_check_meter_reading(
            discharge.total_discharged,
            readings.marcador_inicial,
            readings.marcador_final,
            self.settings.meter_tolerance_ratio,
        );
        discharge.marcador_inicial = Some(readings.marcador_inicial);
        discharge.marcador_final = Some(readings.marcador_final);
        discharge.cantidad_real = Some(check.computed);
        discharge.meter_flagged = !check.within_tolerance;

        if !check.within_tolerance {
            warn!(
                "⚠️ Vale {}: declarado {} gal, marcador {} gal (diferencia {}, tolerancia {})",
                discharge.vale_number, discharge.total_discharged, check.computed, check.delta, check.tolerance
            );
            events.push(DomainEvent::MeterDiscrepancy {
                discharge_id: discharge.id,
                declared: discharge.total_discharged,
                computed: check.computed,
                delta: check.delta,
            });
        }
        Some(check)
    }

    // ── Flota ────────────────────────────────────────────────────────────────

    pub async fn register_truck(&self, caller: &Caller, new_truck: NewTruck) -> AppResult<Truck> {
        if !caller.can_manage_fleet() {
            return Err(forbidden_error("register truck", "admin role required"));
        }
        if new_truck.capacity <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!(
                "La capacidad debe ser mayor que cero (recibido {})",
                new_truck.capacity
            )));
        }
        if new_truck.last_remaining < Decimal::ZERO || new_truck.last_remaining > new_truck.capacity {
            return Err(AppError::InvalidQuantity(format!(
                "El combustible a bordo ({}) debe estar entre 0 y la capacidad ({})",
                new_truck.last_remaining, new_truck.capacity
            )));
        }

        let plate = new_truck.plate.trim().to_uppercase();
        let mut tx = self.store.begin().await?;
        if self.store.plate_exists(&mut tx, &plate).await? {
            return Err(AppError::Conflict(format!("La placa {} ya está registrada", plate)));
        }
        let truck = Truck::new(plate, new_truck.fuel_type, new_truck.capacity, new_truck.last_remaining);
        self.store.insert_truck(&mut tx, &truck).await?;
        self.store.commit(tx).await?;

        info!("🚚 Camión registrado: {} ({})", truck.plate, truck.fuel_type);
        Ok(truck)
    }

    pub async fn register_driver(&self, caller: &Caller, name: String) -> AppResult<Driver> {
        if !caller.can_manage_fleet() {
            return Err(forbidden_error("register driver", "admin role required"));
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("El nombre del conductor es obligatorio".to_string()));
        }

        let driver = Driver::new(name);
        let mut tx = self.store.begin().await?;
        self.store.insert_driver(&mut tx, &driver).await?;
        self.store.commit(tx).await?;
        Ok(driver)
    }

    /// Override manual del estado de un camión
    pub async fn override_truck_state(
        &self,
        caller: &Caller,
        truck_id: Uuid,
        state: TruckState,
    ) -> AppResult<Truck> {
        if !caller.can_override_state() {
            return Err(forbidden_error("override truck state", "admin role required"));
        }

        let mut tx = self.store.begin().await?;
        let truck = self
            .store
            .get_truck(&mut tx, truck_id)
            .await?
            .ok_or_else(|| not_found_error("Truck", &truck_id))?;

        if state == TruckState::Active {
            if let Some(open) = self.store.open_assignment_for_truck(&mut tx, truck_id).await? {
                return Err(AppError::Conflict(format!(
                    "El camión {} tiene la asignación {} abierta",
                    truck.plate, open.dispatch_number
                )));
            }
        }

        let mut events = Vec::new();
        self.state_machine
            .transition_truck(&mut tx, truck_id, state, &mut events)
            .await?;
        let updated = self
            .store
            .get_truck(&mut tx, truck_id)
            .await?
            .ok_or_else(|| not_found_error("Truck", &truck_id))?;
        self.store.commit(tx).await?;
        self.events.publish_all(events);

        info!("🔧 Estado del camión {} fijado a {}", updated.plate, updated.state);
        Ok(updated)
    }

    // ── Asignaciones ─────────────────────────────────────────────────────────

    pub async fn create_assignment(
        &self,
        caller: &Caller,
        truck_id: Uuid,
        driver_id: Uuid,
        total_loaded: Decimal,
        notes: Vec<AssignmentNote>,
    ) -> AppResult<Assignment> {
        if !caller.can_manage_fleet() {
            return Err(forbidden_error("create assignment", "admin role required"));
        }
        if total_loaded <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity(format!(
                "La carga debe ser mayor que cero (recibido {})",
                total_loaded
            )));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let truck = self
            .store
            .get_truck(&mut tx, truck_id)
            .await?
            .ok_or_else(|| not_found_error("Truck", &truck_id))?;
        let driver = self
            .store
            .get_driver(&mut tx, driver_id)
            .await?
            .ok_or_else(|| not_found_error("Driver", &driver_id))?;

        if truck.state != TruckState::Active {
            return Err(AppError::Conflict(format!(
                "El camión {} no está activo (estado: {})",
                truck.plate, truck.state
            )));
        }
        if driver.state != DriverState::Active {
            return Err(AppError::Conflict(format!("El conductor {} no está activo", driver.name)));
        }
        if let Some(open) = self.store.open_assignment_for_truck(&mut tx, truck_id).await? {
            return Err(AppError::Conflict(format!(
                "El camión {} ya tiene la asignación {} abierta",
                truck.plate, open.dispatch_number
            )));
        }
        if total_loaded > truck.capacity {
            return Err(AppError::InvalidQuantity(format!(
                "La carga {} supera la capacidad del camión ({})",
                total_loaded, truck.capacity
            )));
        }

        let dispatch_number = self
            .numbering
            .next_in(&mut tx, IdentifierPrefix::Dispatch, now.year())
            .await?;
        let assignment = Assignment::new(
            dispatch_number,
            truck.id,
            driver.id,
            truck.fuel_type.clone(),
            total_loaded,
            now,
        );
        self.store.insert_assignment(&mut tx, &assignment).await?;

        let mut events = vec![DomainEvent::AssignmentCreated {
            assignment_id: assignment.id,
            truck_id: truck.id,
            driver_id: driver.id,
            dispatch_number: assignment.dispatch_number.clone(),
            total_loaded,
        }];
        self.set_truck_load(&mut tx, truck.id, total_loaded, TruckState::Assigned, &mut events)
            .await?;
        for note in notes {
            self.store
                .insert_note(&mut tx, &AssignmentNoteRecord::new(assignment.id, note))
                .await?;
        }
        self.store.commit(tx).await?;
        self.events.publish_all(events);

        info!(
            "✅ Asignación {} creada: {} gal en {} para {}",
            assignment.dispatch_number, total_loaded, truck.plate, driver.name
        );
        Ok(assignment)
    }

    pub async fn allocate_to_client(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
        customer_id: Uuid,
        allocated_quantity: Decimal,
    ) -> AppResult<ClientAssignment> {
        if !caller.can_allocate() {
            return Err(forbidden_error("allocate fuel", "admin role required"));
        }

        let mut tx = self.store.begin().await?;
        let assignment = self.load_assignment(&mut tx, assignment_id).await?;
        if assignment.is_completed {
            return Err(AppError::Conflict(format!(
                "La asignación {} ya está completada",
                assignment.dispatch_number
            )));
        }

        let existing = self.store.list_client_assignments(&mut tx, assignment_id).await?;
        if existing.iter().any(|ca| ca.customer_id == customer_id) {
            return Err(AppError::DuplicateAllocation {
                assignment_id,
                customer_id,
            });
        }
        let allocated: Decimal = existing.iter().map(|ca| ca.allocated_quantity).sum();
        fuel_ledger::validate_allocation(assignment.total_loaded, allocated, allocated_quantity)?;

        let ca = ClientAssignment::new(assignment_id, customer_id, allocated_quantity);
        self.store.insert_client_assignment(&mut tx, &ca).await?;
        self.store.commit(tx).await?;
        self.events.publish_all(vec![DomainEvent::AllocationCreated {
            assignment_id,
            customer_id,
            allocated_quantity,
        }]);
        Ok(ca)
    }

    pub async fn complete_assignment(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
        forced: bool,
    ) -> AppResult<Assignment> {
        self.state_machine.complete(caller, assignment_id, forced).await
    }

    // ── Descargas ────────────────────────────────────────────────────────────

    /// Registra una entrega de combustible contra una asignación. Descuento del
    /// saldo, descarga, camión y asignación a cliente se aplican juntos o no
    /// se aplican; un fallo no se reintenta aquí.
    pub async fn record_discharge(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
        meter_readings: Option<MeterReadings>,
    ) -> AppResult<Discharge> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let assignment = self.load_assignment(&mut tx, assignment_id).await?;

        if !caller.can_record_discharge(&assignment) {
            return Err(forbidden_error("record discharge", "assignment belongs to another driver"));
        }
        if assignment.is_completed {
            return Err(AppError::Conflict(format!(
                "La asignación {} ya está completada",
                assignment.dispatch_number
            )));
        }

        fuel_ledger::validate_discharge(assignment.total_remaining, amount)?;

        let mut allocation = self
            .store
            .list_client_assignments(&mut tx, assignment_id)
            .await?
            .into_iter()
            .find(|ca| ca.customer_id == customer_id && ca.status == ClientAssignmentStatus::Pending);
        if let Some(ca) = &allocation {
            fuel_ledger::validate_discharge(ca.remaining_quantity, amount)?;
        }

        let vale_number = self
            .numbering
            .next_in(&mut tx, IdentifierPrefix::Vale, now.year())
            .await?;

        let new_remaining = self
            .store
            .try_decrement_remaining(&mut tx, assignment_id, amount)
            .await?
            .ok_or_else(|| {
                AppError::ConcurrencyConflict(format!(
                    "El saldo de la asignación {} cambió durante la operación",
                    assignment.dispatch_number
                ))
            })?;

        let mut events = Vec::new();
        let mut discharge = Discharge::new(vale_number, assignment_id, customer_id, amount, now);
        discharge.client_assignment_id = allocation.as_ref().map(|ca| ca.id);
        self.apply_meter_check(&mut discharge, meter_readings, &mut events);
        self.store.insert_discharge(&mut tx, &discharge).await?;

        if let Some(ca) = allocation.as_mut() {
            ca.apply_delivery(amount, now);
            self.store.update_client_assignment(&mut tx, ca).await?;
        }

        self.set_truck_load(
            &mut tx,
            assignment.truck_id,
            new_remaining,
            truck_state_for_load(new_remaining),
            &mut events,
        )
        .await?;

        events.insert(
            0,
            DomainEvent::DischargeRecorded {
                discharge_id: discharge.id,
                assignment_id,
                customer_id,
                vale_number: discharge.vale_number.clone(),
                amount,
                remaining: new_remaining,
            },
        );

        let updated = self.load_assignment(&mut tx, assignment_id).await?;
        self.state_machine.evaluate(&mut tx, &updated, now, &mut events).await?;
        let discharge = self.load_discharge(&mut tx, discharge.id).await?;
        self.store.commit(tx).await?;
        self.events.publish_all(events);

        info!(
            "⛽ Vale {}: {} gal entregados en {} (restan {})",
            discharge.vale_number, amount, assignment.dispatch_number, new_remaining
        );
        Ok(discharge)
    }

    /// Corrección administrativa de la cantidad de una descarga
    pub async fn correct_discharge(
        &self,
        caller: &Caller,
        discharge_id: Uuid,
        new_amount: Decimal,
        meter_readings: Option<MeterReadings>,
    ) -> AppResult<Discharge> {
        if !caller.can_correct_discharges() {
            return Err(forbidden_error("correct discharge", "admin role required"));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut discharge = self.load_discharge(&mut tx, discharge_id).await?;
        let assignment = self.load_assignment(&mut tx, discharge.assignment_id).await?;
        if assignment.is_completed {
            return Err(AppError::Conflict(format!(
                "La asignación {} ya está completada; elimine la descarga para reabrirla",
                assignment.dispatch_number
            )));
        }

        let previous_amount = discharge.total_discharged;
        fuel_ledger::validate_discharge(assignment.total_remaining + previous_amount, new_amount)?;

        let mut allocation = self.linked_allocation(&mut tx, &discharge).await?;
        if let Some(ca) = allocation.as_mut() {
            ca.revert_delivery(previous_amount);
            fuel_ledger::validate_discharge(ca.remaining_quantity, new_amount)?;
            ca.apply_delivery(new_amount, now);
            self.store.update_client_assignment(&mut tx, ca).await?;
        }

        let delta = new_amount - previous_amount;
        let new_remaining = if delta > Decimal::ZERO {
            self.store
                .try_decrement_remaining(&mut tx, assignment.id, delta)
                .await?
                .ok_or_else(|| {
                    AppError::ConcurrencyConflict(format!(
                        "El saldo de la asignación {} cambió durante la operación",
                        assignment.dispatch_number
                    ))
                })?
        } else if delta < Decimal::ZERO {
            self.store.restore_remaining(&mut tx, assignment.id, -delta).await?
        } else {
            assignment.total_remaining
        };

        let mut events = vec![DomainEvent::DischargeCorrected {
            discharge_id,
            assignment_id: assignment.id,
            previous_amount,
            amount: new_amount,
        }];
        discharge.total_discharged = new_amount;
        discharge.updated_at = now;
        self.apply_meter_check(&mut discharge, meter_readings, &mut events);
        self.store.update_discharge(&mut tx, &discharge).await?;

        self.set_truck_load(
            &mut tx,
            assignment.truck_id,
            new_remaining,
            truck_state_for_load(new_remaining),
            &mut events,
        )
        .await?;

        let updated = self.load_assignment(&mut tx, assignment.id).await?;
        self.state_machine.evaluate(&mut tx, &updated, now, &mut events).await?;
        let discharge = self.load_discharge(&mut tx, discharge_id).await?;
        self.store.commit(tx).await?;
        self.events.publish_all(events);

        info!(
            "✏️ Vale {} corregido: {} → {} gal",
            discharge.vale_number, previous_amount, new_amount
        );
        Ok(discharge)
    }

    /// Asignación a cliente sobre la que se contó la descarga, si sigue vigente.
    /// Las entregas no planificadas no tocan ninguna asignación a cliente.
    async fn linked_allocation(
        &self,
        tx: &mut S::Tx,
        discharge: &Discharge,
    ) -> AppResult<Option<ClientAssignment>> {
        let Some(linked_id) = discharge.client_assignment_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .list_client_assignments(tx, discharge.assignment_id)
            .await?
            .into_iter()
            .find(|ca| ca.id == linked_id && ca.status != ClientAssignmentStatus::Expired))
    }

    /// Elimina una descarga revirtiendo su efecto sobre los saldos
    pub async fn delete_discharge(&self, caller: &Caller, discharge_id: Uuid) -> AppResult<Assignment> {
        if !caller.can_correct_discharges() {
            return Err(forbidden_error("delete discharge", "admin role required"));
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let discharge = self.load_discharge(&mut tx, discharge_id).await?;
        let assignment = self.load_assignment(&mut tx, discharge.assignment_id).await?;

        let restored = self
            .store
            .restore_remaining(&mut tx, assignment.id, discharge.total_discharged)
            .await?;

        if let Some(mut ca) = self.linked_allocation(&mut tx, &discharge).await? {
            ca.revert_delivery(discharge.total_discharged);
            self.store.update_client_assignment(&mut tx, &ca).await?;
        }
        self.store.delete_discharge(&mut tx, discharge_id).await?;

        let mut events = vec![DomainEvent::DischargeDeleted {
            discharge_id,
            assignment_id: assignment.id,
            restored: discharge.total_discharged,
        }];

        let updated = self.load_assignment(&mut tx, assignment.id).await?;
        self.state_machine.evaluate(&mut tx, &updated, now, &mut events).await?;
        let updated = self.load_assignment(&mut tx, assignment.id).await?;

        // La carga del camión solo sigue a su asignación más reciente
        let latest = self
            .store
            .latest_assignment_for_truck(&mut tx, assignment.truck_id)
            .await?;
        if latest.map(|a| a.id) == Some(assignment.id) {
            let truck = self
                .store
                .get_truck(&mut tx, assignment.truck_id)
                .await?
                .ok_or_else(|| not_found_error("Truck", &assignment.truck_id))?;
            let state = if updated.is_completed {
                truck.state
            } else if self.store.list_discharges(&mut tx, assignment.id).await?.is_empty() {
                TruckState::Assigned
            } else {
                TruckState::Unloading
            };
            self.set_truck_load(&mut tx, truck.id, restored, state, &mut events)
                .await?;
        }

        self.store.commit(tx).await?;
        self.events.publish_all(events);

        warn!(
            "🗑️ Vale {} eliminado: {} gal devueltos a {}",
            discharge.vale_number, discharge.total_discharged, assignment.dispatch_number
        );
        Ok(updated)
    }

    // ── Notas ────────────────────────────────────────────────────────────────

    pub async fn add_note(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
        note: AssignmentNote,
    ) -> AppResult<AssignmentNoteRecord> {
        let mut tx = self.store.begin().await?;
        let assignment = self.load_assignment(&mut tx, assignment_id).await?;
        if !caller.can_view_assignment(&assignment) {
            return Err(forbidden_error("annotate assignment", "assignment belongs to another driver"));
        }
        let record = AssignmentNoteRecord::new(assignment_id, note);
        self.store.insert_note(&mut tx, &record).await?;
        self.store.commit(tx).await?;
        Ok(record)
    }

    pub async fn list_notes(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
    ) -> AppResult<Vec<AssignmentNoteRecord>> {
        retry_read("list_notes", move || async move {
            let mut tx = self.store.begin().await?;
            let assignment = self.load_assignment(&mut tx, assignment_id).await?;
            if !caller.can_view_assignment(&assignment) {
                return Err(forbidden_error("view assignment", "assignment belongs to another driver"));
            }
            let notes = self.store.list_notes(&mut tx, assignment_id).await?;
            self.store.rollback(tx).await?;
            Ok(notes)
        })
        .await
    }

    // ── Consultas ────────────────────────────────────────────────────────────

    pub async fn assignment_summary(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
    ) -> AppResult<AssignmentSummary> {
        retry_read("assignment_summary", move || self.load_summary(caller, assignment_id)).await
    }

    async fn load_summary(&self, caller: &Caller, assignment_id: Uuid) -> AppResult<AssignmentSummary> {
        let mut tx = self.store.begin().await?;
        let assignment = self.load_assignment(&mut tx, assignment_id).await?;
        if !caller.can_view_assignment(&assignment) {
            return Err(forbidden_error("view assignment", "assignment belongs to another driver"));
        }
        let client_assignments = self.store.list_client_assignments(&mut tx, assignment_id).await?;
        let discharges = self.store.list_discharges(&mut tx, assignment_id).await?;
        let notes = self.store.list_notes(&mut tx, assignment_id).await?;
        self.store.rollback(tx).await?;

        let amounts = discharges.iter().map(|d| d.total_discharged);
        let total_discharged: Decimal = amounts.clone().sum();
        let expected_remaining = fuel_ledger::expected_remaining(assignment.total_loaded, amounts.clone());
        let balance_ok = fuel_ledger::is_conserved(assignment.total_loaded, amounts, assignment.total_remaining);
        if !balance_ok {
            warn!(
                "⚠️ Asignación {} descuadrada: saldo {} vs esperado {}",
                assignment.dispatch_number, assignment.total_remaining, expected_remaining
            );
        }

        Ok(AssignmentSummary {
            phase: assignment.phase(&client_assignments),
            assignment,
            client_assignments,
            discharges,
            notes,
            total_discharged,
            expected_remaining,
            balance_ok,
        })
    }

    // ── Numeración y barridos ────────────────────────────────────────────────

    /// Reserva el siguiente número de vale del año en curso
    pub async fn next_vale_number(&self, caller: &Caller, prefix: IdentifierPrefix) -> AppResult<String> {
        if prefix == IdentifierPrefix::Dispatch && !caller.can_manage_fleet() {
            return Err(forbidden_error("reserve dispatch number", "admin role required"));
        }
        self.numbering.next(prefix, Utc::now().year()).await
    }

    pub async fn sweep_stale_assignments(&self, caller: &Caller) -> AppResult<SweepReport> {
        self.state_machine.sweep_stale_assignments(caller, Utc::now()).await
    }

    pub async fn sweep_stale_assignments_at(
        &self,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> AppResult<SweepReport> {
        self.state_machine.sweep_stale_assignments(caller, now).await
    }

    pub async fn refresh_fleet_state(&self, caller: &Caller) -> AppResult<FleetRefreshReport> {
        self.state_machine.refresh_fleet_state(caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retry_read_retries_transient_once() {
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let result: AppResult<u32> = retry_read("test", || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_read_does_not_retry_business_errors() {
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let result: AppResult<u32> = retry_read("test", || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(AppError::NotFound("x".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truck_state_follows_load() {
        assert_eq!(truck_state_for_load(Decimal::from(5)), TruckState::Unloading);
        assert_eq!(truck_state_for_load(Decimal::ZERO), TruckState::Active);
    }
}
