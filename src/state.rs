//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use crate::config::environment::EnvironmentConfig;
use crate::middleware::auth::JwtKeys;
use crate::repositories::FuelStore;
use crate::services::ReconciliationService;

pub struct AppState<S: FuelStore> {
    pub service: ReconciliationService<S>,
    pub config: EnvironmentConfig,
    pub jwt: JwtKeys,
}

impl<S: FuelStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            config: self.config.clone(),
            jwt: self.jwt.clone(),
        }
    }
}

impl<S: FuelStore> AppState<S> {
    pub fn new(service: ReconciliationService<S>, config: EnvironmentConfig) -> Self {
        let jwt = JwtKeys::from_secret(&config.jwt_secret);
        Self { service, config, jwt }
    }
}
