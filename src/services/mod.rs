//! Services module
//!
//! Este módulo contiene la lógica del motor de despacho: el libro de
//! combustible, la máquina de estados de asignaciones, la reconciliación y
//! la numeración de vales y despachos.

pub mod assignment_state_machine;
pub mod event_publisher;
pub mod fuel_ledger;
pub mod numbering_service;
pub mod reconciliation_service;

pub use assignment_state_machine::{AssignmentStateMachine, FleetRefreshReport, SweepReport};
pub use event_publisher::EventPublisher;
pub use numbering_service::{IdentifierPrefix, NumberingService};
pub use reconciliation_service::{AssignmentSummary, NewTruck, ReconciliationService};
