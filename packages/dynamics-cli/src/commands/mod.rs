pub mod clean;
pub mod destinations;
pub mod service;
pub mod stream;
pub mod streams;

use crate::cli::Globals;
use crate::exit_codes;
use anyhow::Context;
use dynamics_api::{ClientConfig, ConfigError, DeviceClient, DeviceRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Opens a registry with a single device handle. The registry must outlive
/// the handle's use; dropping it removes every destination the run registered.
pub fn connect(
    globals: &Globals,
    mut config: ClientConfig,
) -> anyhow::Result<(DeviceRegistry, Arc<DeviceClient>)> {
    let address = globals
        .device
        .as_deref()
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "no device given, use --device or set DYNAMICS_DEVICE".to_string(),
            )
        })?;
    if let Some(ms) = globals.timeout_ms {
        config.request_timeout = Duration::from_millis(ms);
    }

    let timeout = config.request_timeout;
    let registry = DeviceRegistry::new(config);
    let device = registry
        .get_or_create(address, timeout)
        .with_context(|| format!("Could not connect to device {}", address))?;
    Ok((registry, device))
}

/// Reports an error on stderr and turns the outcome into an exit code.
pub fn finish(result: anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::for_error(&e)
        }
    }
}
