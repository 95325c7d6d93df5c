//! Modelos del sistema
//!
//! Este módulo contiene los registros de dominio del motor de despacho:
//! camiones, conductores, asignaciones, entregas y eventos.

pub mod assignment;
pub mod assignment_note;
pub mod auth;
pub mod client_assignment;
pub mod discharge;
pub mod events;
pub mod truck;

pub use assignment::{Assignment, AssignmentPhase};
pub use assignment_note::{AssignmentNote, AssignmentNoteRecord};
pub use auth::{Caller, UserRole};
pub use client_assignment::{ClientAssignment, ClientAssignmentStatus};
pub use discharge::{Discharge, DischargeStatus, MeterReadings};
pub use events::DomainEvent;
pub use truck::{Driver, DriverState, FuelType, Truck, TruckState};
