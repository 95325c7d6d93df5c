//! AssignmentStateMachine
//!
//! Transiciones de una asignación (Open → Completing → Completed) y del
//! camión que la lleva (Active → Assigned → Unloading → Active). Los cambios
//! de asignación y camión se aplican siempre dentro de la misma transacción.
//!
//! Incluye los dos barridos de reconciliación por lotes: auto-expiración de
//! asignaciones abandonadas y refresco del estado de la flota. Ambos son
//! idempotentes y usan las mismas primitivas transaccionales que las
//! escrituras en vivo.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::models::assignment::unresolved_customers;
use crate::models::{
    Assignment, AssignmentPhase, Caller, ClientAssignment, ClientAssignmentStatus, DomainEvent, Truck,
    TruckState,
};
use crate::repositories::FuelStore;
use crate::services::event_publisher::EventPublisher;
use crate::utils::errors::{forbidden_error, not_found_error, AppError, AppResult};

/// Comprueba si una asignación puede cerrarse sin override
pub fn check_completion(assignment: &Assignment, client_assignments: &[ClientAssignment]) -> AppResult<()> {
    if assignment.is_completed {
        return Err(AppError::Conflict(format!(
            "La asignación {} ya está completada",
            assignment.dispatch_number
        )));
    }
    let pending = unresolved_customers(client_assignments);
    if !pending.is_empty() {
        return Err(AppError::IncompleteDeliveries { customers: pending });
    }
    if assignment.total_remaining > Decimal::ZERO {
        return Err(AppError::Conflict(format!(
            "Quedan {} gal sin descargar en la asignación {}",
            assignment.total_remaining, assignment.dispatch_number
        )));
    }
    Ok(())
}

/// Corrección que necesita un camión según su asignación más reciente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetFix {
    pub reopen_assignment: bool,
    pub truck_state: Option<TruckState>,
}

impl FleetFix {
    pub fn is_noop(&self) -> bool {
        !self.reopen_assignment && self.truck_state.is_none()
    }
}

/// Estados que el admin fija a mano y que el barrido no pisa
fn is_manual_hold(state: TruckState) -> bool {
    matches!(state, TruckState::Inactive | TruckState::Maintenance)
}

pub fn plan_fleet_fix(
    truck: &Truck,
    latest: Option<&Assignment>,
    client_assignments: &[ClientAssignment],
) -> FleetFix {
    let target = |state: TruckState| (truck.state != state).then_some(state);

    match latest {
        None => {
            if matches!(truck.state, TruckState::Assigned | TruckState::Unloading) {
                FleetFix {
                    reopen_assignment: false,
                    truck_state: Some(TruckState::Active),
                }
            } else {
                FleetFix::default()
            }
        }
        Some(assignment) if assignment.is_completed => {
            if unresolved_customers(client_assignments).is_empty() {
                if is_manual_hold(truck.state) {
                    FleetFix::default()
                } else {
                    FleetFix {
                        reopen_assignment: false,
                        truck_state: target(TruckState::Active),
                    }
                }
            } else {
                FleetFix {
                    reopen_assignment: true,
                    truck_state: target(TruckState::Assigned),
                }
            }
        }
        Some(_) => FleetFix {
            reopen_assignment: false,
            truck_state: target(TruckState::Assigned),
        },
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_assignments: usize,
    pub expired_allocations: usize,
    pub finalized_discharges: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FleetRefreshReport {
    pub trucks_checked: usize,
    pub trucks_updated: usize,
    pub assignments_reopened: usize,
}

pub struct AssignmentStateMachine<S: FuelStore> {
    store: Arc<S>,
    events: EventPublisher,
    settings: DispatchSettings,
}

impl<S: FuelStore> Clone for AssignmentStateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: self.events.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: FuelStore> AssignmentStateMachine<S> {
    pub fn new(store: Arc<S>, events: EventPublisher, settings: DispatchSettings) -> Self {
        Self {
            store,
            events,
            settings,
        }
    }

    /// Cambia el estado del camión y anota el evento si hubo cambio
    pub(crate) async fn transition_truck(
        &self,
        tx: &mut S::Tx,
        truck_id: Uuid,
        to: TruckState,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<()> {
        let truck = self
            .store
            .get_truck(tx, truck_id)
            .await?
            .ok_or_else(|| not_found_error("Truck", &truck_id))?;
        if truck.state != to {
            self.store.set_truck_state(tx, truck_id, to).await?;
            events.push(DomainEvent::TruckStateChanged {
                truck_id,
                from: truck.state,
                to,
            });
        }
        Ok(())
    }

    /// Re-evalúa una asignación tras un cambio en sus sub-unidades: la cierra
    /// si ya no queda nada por resolver, o la reabre si estaba cerrada con
    /// entregas pendientes.
    pub async fn evaluate(
        &self,
        tx: &mut S::Tx,
        assignment: &Assignment,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<AssignmentPhase> {
        let client_assignments = self.store.list_client_assignments(tx, assignment.id).await?;
        match assignment.phase(&client_assignments) {
            AssignmentPhase::Completing => {
                self.complete_within(tx, assignment, false, now, events).await?;
                Ok(AssignmentPhase::Completed)
            }
            AssignmentPhase::Completed if !unresolved_customers(&client_assignments).is_empty() => {
                self.reopen_within(tx, assignment, events).await?;
                Ok(AssignmentPhase::Open)
            }
            phase => Ok(phase),
        }
    }

    pub(crate) async fn complete_within(
        &self,
        tx: &mut S::Tx,
        assignment: &Assignment,
        forced: bool,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<u64> {
        self.store.set_assignment_completion(tx, assignment.id, Some(now)).await?;
        let finalized = self.store.finalize_discharges(tx, assignment.id).await?;
        self.transition_truck(tx, assignment.truck_id, TruckState::Active, events)
            .await?;
        events.push(DomainEvent::AssignmentCompleted {
            assignment_id: assignment.id,
            truck_id: assignment.truck_id,
            forced,
            completed_at: now,
        });
        info!(
            "✅ Asignación {} completada (override: {})",
            assignment.dispatch_number, forced
        );
        Ok(finalized)
    }

    pub(crate) async fn reopen_within(
        &self,
        tx: &mut S::Tx,
        assignment: &Assignment,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<()> {
        if let Some(open) = self.store.open_assignment_for_truck(tx, assignment.truck_id).await? {
            if open.id != assignment.id {
                return Err(AppError::Conflict(format!(
                    "No se puede reabrir {}: el camión ya tiene abierta la asignación {}",
                    assignment.dispatch_number, open.dispatch_number
                )));
            }
        }
        self.store.set_assignment_completion(tx, assignment.id, None).await?;
        self.transition_truck(tx, assignment.truck_id, TruckState::Assigned, events)
            .await?;
        events.push(DomainEvent::AssignmentReopened {
            assignment_id: assignment.id,
            truck_id: assignment.truck_id,
        });
        warn!(
            "↩️ Asignación {} reabierta: tenía entregas pendientes",
            assignment.dispatch_number
        );
        Ok(())
    }

    /// Expira toda asignación a cliente pendiente; devuelve cuántas
    async fn expire_pending_within(
        &self,
        tx: &mut S::Tx,
        assignment_id: Uuid,
        now: DateTime<Utc>,
        events: &mut Vec<DomainEvent>,
    ) -> AppResult<usize> {
        let client_assignments = self.store.list_client_assignments(tx, assignment_id).await?;
        let mut expired = 0;
        for mut ca in client_assignments
            .into_iter()
            .filter(|ca| ca.status == ClientAssignmentStatus::Pending)
        {
            ca.expire(now);
            self.store.update_client_assignment(tx, &ca).await?;
            events.push(DomainEvent::ClientAssignmentExpired {
                assignment_id,
                customer_id: ca.customer_id,
            });
            expired += 1;
        }
        Ok(expired)
    }

    /// Cierre explícito de una asignación. Con `forced` (override de admin) las
    /// entregas pendientes se expiran antes de cerrar.
    pub async fn complete(
        &self,
        caller: &Caller,
        assignment_id: Uuid,
        forced: bool,
    ) -> AppResult<Assignment> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let assignment = self
            .store
            .get_assignment(&mut tx, assignment_id)
            .await?
            .ok_or_else(|| not_found_error("Assignment", &assignment_id))?;

        if !caller.can_complete_assignment(&assignment) {
            return Err(forbidden_error("complete assignment", "not the assigned driver"));
        }
        if forced && !caller.can_override_state() {
            return Err(forbidden_error("force completion", "admin role required"));
        }

        let mut events = Vec::new();
        if forced {
            if assignment.is_completed {
                return Err(AppError::Conflict(format!(
                    "La asignación {} ya está completada",
                    assignment.dispatch_number
                )));
            }
            self.expire_pending_within(&mut tx, assignment.id, now, &mut events)
                .await?;
        } else {
            let client_assignments = self.store.list_client_assignments(&mut tx, assignment.id).await?;
            check_completion(&assignment, &client_assignments)?;
        }

        self.complete_within(&mut tx, &assignment, forced, now, &mut events)
            .await?;
        let completed = self
            .store
            .get_assignment(&mut tx, assignment.id)
            .await?
            .ok_or_else(|| not_found_error("Assignment", &assignment.id))?;
        self.store.commit(tx).await?;
        self.events.publish_all(events);
        Ok(completed)
    }

    /// Auto-completa asignaciones abiertas con más antigüedad que el umbral.
    /// Cada asignación se procesa en su propia transacción y se vuelve a leer
    /// bajo bloqueo, así que correrlo dos veces (o en paralelo) no duplica nada.
    pub async fn sweep_stale_assignments(
        &self,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> AppResult<SweepReport> {
        if !caller.can_run_sweeps() {
            return Err(forbidden_error("run sweeps", "admin role required"));
        }
        let cutoff = now - self.settings.stale_after;

        let mut tx = self.store.begin().await?;
        let candidates = self
            .store
            .list_open_assignments_created_before(&mut tx, cutoff)
            .await?;
        self.store.rollback(tx).await?;

        let mut report = SweepReport::default();
        for candidate in candidates {
            let mut tx = self.store.begin().await?;
            let Some(assignment) = self.store.get_assignment(&mut tx, candidate.id).await? else {
                self.store.rollback(tx).await?;
                continue;
            };
            if !assignment.is_stale(now, self.settings.stale_after) {
                self.store.rollback(tx).await?;
                continue;
            }

            let mut events = Vec::new();
            let expired = self
                .expire_pending_within(&mut tx, assignment.id, now, &mut events)
                .await?;
            let finalized = self
                .complete_within(&mut tx, &assignment, true, now, &mut events)
                .await?;
            self.store.commit(tx).await?;
            self.events.publish_all(events);

            report.expired_assignments += 1;
            report.expired_allocations += expired;
            report.finalized_discharges += finalized;
        }

        if report.expired_assignments > 0 {
            info!(
                "🧹 Barrido de asignaciones vencidas: {} asignaciones, {} entregas expiradas",
                report.expired_assignments, report.expired_allocations
            );
        }
        Ok(report)
    }

    /// Alinea el estado de cada camión con su asignación más reciente y
    /// reabre asignaciones cerradas por error con entregas pendientes.
    pub async fn refresh_fleet_state(&self, caller: &Caller) -> AppResult<FleetRefreshReport> {
        if !caller.can_run_sweeps() {
            return Err(forbidden_error("run sweeps", "admin role required"));
        }

        let mut tx = self.store.begin().await?;
        let trucks = self.store.list_trucks(&mut tx).await?;
        self.store.rollback(tx).await?;

        let mut report = FleetRefreshReport::default();
        for listed in trucks {
            report.trucks_checked += 1;
            let mut tx = self.store.begin().await?;
            let Some(truck) = self.store.get_truck(&mut tx, listed.id).await? else {
                self.store.rollback(tx).await?;
                continue;
            };
            let latest = self.store.latest_assignment_for_truck(&mut tx, truck.id).await?;
            let client_assignments = match &latest {
                Some(a) => self.store.list_client_assignments(&mut tx, a.id).await?,
                None => Vec::new(),
            };

            let fix = plan_fleet_fix(&truck, latest.as_ref(), &client_assignments);
            if fix.is_noop() {
                self.store.rollback(tx).await?;
                continue;
            }

            let mut events = Vec::new();
            if let (true, Some(assignment)) = (fix.reopen_assignment, &latest) {
                self.store.set_assignment_completion(&mut tx, assignment.id, None).await?;
                events.push(DomainEvent::AssignmentReopened {
                    assignment_id: assignment.id,
                    truck_id: truck.id,
                });
                report.assignments_reopened += 1;
            }
            if let Some(state) = fix.truck_state {
                self.store.set_truck_state(&mut tx, truck.id, state).await?;
                events.push(DomainEvent::TruckStateChanged {
                    truck_id: truck.id,
                    from: truck.state,
                    to: state,
                });
                report.trucks_updated += 1;
            }
            self.store.commit(tx).await?;
            self.events.publish_all(events);
        }

        if report.trucks_updated > 0 || report.assignments_reopened > 0 {
            info!(
                "🚚 Refresco de flota: {} camiones corregidos, {} asignaciones reabiertas",
                report.trucks_updated, report.assignments_reopened
            );
        }
        Ok(report)
    }
}
