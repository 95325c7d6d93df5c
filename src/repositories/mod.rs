//! Repositorios
//!
//! El colaborador de persistencia del motor y sus implementaciones.

pub mod fuel_store;
pub mod memory_store;
pub mod postgres_store;

pub use fuel_store::FuelStore;
pub use memory_store::MemoryFuelStore;
pub use postgres_store::PgFuelStore;
