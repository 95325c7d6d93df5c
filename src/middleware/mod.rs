//! Middleware del sistema
//!
//! Este módulo contiene el middleware de autenticación JWT y CORS.

pub mod auth;
pub mod cors;

pub use auth::{auth_middleware, generate_jwt_token, JwtKeys};
pub use cors::cors_layer;
