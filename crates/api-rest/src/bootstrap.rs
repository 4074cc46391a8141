//! Startup wiring shared by the standalone REST binary and `flow-run`.
//!
//! Environment variables are read exactly once here and handed to the core's parsing helpers, so
//! a bad value fails startup rather than a request.

use flow_core::config::{
    capacity_from_env_value, tenants_from_env_value, utc_offset_from_env_value,
};
use flow_core::constants::{DEFAULT_BROADCAST_CAPACITY, DEFAULT_EVENT_HISTORY};
use flow_core::{
    CoreConfig, FlowRegistry, InMemoryDirectory, PatientDirectory, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Resolve [`CoreConfig`] from `FLOW_*` environment variables.
pub fn config_from_env() -> anyhow::Result<CoreConfig> {
    let data_dir = var("FLOW_DATA_DIR")
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let utc_offset = utc_offset_from_env_value(var("FLOW_UTC_OFFSET_MINUTES"))?;
    let history = capacity_from_env_value(
        "FLOW_EVENT_HISTORY",
        var("FLOW_EVENT_HISTORY"),
        DEFAULT_EVENT_HISTORY,
    )?;
    let broadcast = capacity_from_env_value(
        "FLOW_BROADCAST_CAPACITY",
        var("FLOW_BROADCAST_CAPACITY"),
        DEFAULT_BROADCAST_CAPACITY,
    )?;

    Ok(CoreConfig::new(data_dir, utc_offset, history, broadcast)?)
}

/// Load the patient directory named by `FLOW_PATIENT_DIRECTORY`, or an empty one.
pub fn directory_from_env() -> anyhow::Result<Arc<dyn PatientDirectory>> {
    let directory = match var("FLOW_PATIENT_DIRECTORY").filter(|v| !v.trim().is_empty()) {
        Some(path) => InMemoryDirectory::load_json(&PathBuf::from(path.trim()))?,
        None => {
            tracing::warn!("FLOW_PATIENT_DIRECTORY not set; every arrival will be rejected");
            InMemoryDirectory::new()
        }
    };
    Ok(Arc::new(directory))
}

/// Build a registry with every tenant listed in `FLOW_TENANTS` opened (and restored from its
/// snapshot, if one exists).
pub fn registry_from_env() -> anyhow::Result<Arc<FlowRegistry>> {
    let config = config_from_env()?;
    let directory = directory_from_env()?;
    let registry = Arc::new(FlowRegistry::new(config, Arc::new(SystemClock), directory));

    let tenants = tenants_from_env_value(var("FLOW_TENANTS"))?;
    if tenants.is_empty() {
        tracing::warn!("FLOW_TENANTS is empty; no tenant routes will resolve");
    }
    for tenant_id in tenants {
        let flow = registry.register_tenant(tenant_id)?;
        tracing::info!(
            "tenant {} ready at sequence {}",
            tenant_id,
            flow.events().last_sequence()
        );
    }
    Ok(registry)
}

/// The expected API key, from `API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    let key = var("API_KEY").filter(|k| !k.trim().is_empty());
    if key.is_none() {
        tracing::warn!("API_KEY not set; tenant routes will refuse every request");
    }
    key
}

pub fn rest_addr_from_env() -> String {
    var("FLOW_REST_ADDR").unwrap_or_else(|| DEFAULT_REST_ADDR.into())
}
