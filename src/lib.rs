//! Fuel Dispatch
//!
//! Motor de reconciliación de combustible para despacho con camiones
//! cisterna: asignaciones, entregas por cliente, vales y el ciclo de vida
//! camión/asignación, expuesto por una API HTTP delgada.

pub mod config;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
