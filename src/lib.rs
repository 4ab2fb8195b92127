use std::sync::Arc;

use crate::config::CapacityConfig;
use crate::domain::capacity_model::CapacityModel;
use crate::domain::utils::emitter::{DiagnosticEmitter, LogEmitter};
use crate::error::Result;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Builds the capacity model described by `config`, reporting through the `log` facade.
pub fn generate_capacity_model(config: &CapacityConfig) -> Result<CapacityModel> {
    generate_capacity_model_with(config, Arc::new(LogEmitter))
}

pub fn generate_capacity_model_with(config: &CapacityConfig, emitter: Arc<dyn DiagnosticEmitter>) -> Result<CapacityModel> {
    log::debug!("Loading capacity of PBS server {}.", config.server);

    let source = config.capacity_source();
    let diagnose = config.diagnose_source();
    let model = CapacityModel::load(&config.server, source.as_ref(), &diagnose, emitter)?;

    log::debug!("Capacity model of {} constructed: {} reservations.", config.server, model.reservations().len());
    Ok(model)
}
