use crate::config::ClientConfig;
use crate::control::{DeviceClient, StaleDestination};
use crate::error::Result;
use crate::net;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub type Connector = dyn Fn(Ipv4Addr, &ClientConfig) -> Result<DeviceClient> + Send + Sync;

/// Handle for one address, filled by the first caller that connects.
type Slot = Arc<Mutex<Option<Arc<DeviceClient>>>>;

/// Device handles keyed by address, at most one per address.
///
/// Owned by the application root. Dropping the registry removes every
/// destination the handles registered.
pub struct DeviceRegistry {
    devices: Mutex<HashMap<Ipv4Addr, Slot>>,
    config: ClientConfig,
    connector: Box<Connector>,
}

impl DeviceRegistry {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, |address, config| {
            DeviceClient::connect(&address.to_string(), config.clone())
        })
    }

    /// Registry that builds handles with `connector` instead of HTTP.
    pub fn with_connector<F>(config: ClientConfig, connector: F) -> Self
    where
        F: Fn(Ipv4Addr, &ClientConfig) -> Result<DeviceClient> + Send + Sync + 'static,
    {
        Self {
            devices: Mutex::new(HashMap::new()),
            config,
            connector: Box::new(connector),
        }
    }

    /// Existing handle for `address`, or a new one using `timeout` for its
    /// control-plane requests.
    ///
    /// Concurrent callers for the same address wait for a single construction.
    /// Other addresses are not blocked by it.
    pub fn get_or_create(&self, address: &str, timeout: Duration) -> Result<Arc<DeviceClient>> {
        let address = net::parse_ipv4(address)?;
        let slot = Arc::clone(self.devices.lock().entry(address).or_default());

        let mut handle = slot.lock();
        if let Some(device) = handle.as_ref() {
            return Ok(Arc::clone(device));
        }

        let mut config = self.config.clone();
        config.request_timeout = timeout;
        let device = Arc::new((self.connector)(address, &config)?);
        *handle = Some(Arc::clone(&device));
        debug!("Registered device handle for {}", address);
        Ok(device)
    }

    pub fn get(&self, address: &str) -> Option<Arc<DeviceClient>> {
        let address = net::parse_ipv4(address).ok()?;
        let slot = self.devices.lock().get(&address).cloned()?;
        let device = slot.lock().clone();
        device
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        let mut addresses: Vec<Ipv4Addr> = self
            .handles()
            .iter()
            .map(|device| device.address())
            .collect();
        addresses.sort();
        addresses
    }

    /// Removes every tracked destination on every device and forgets all
    /// handles. Returns what could not be removed.
    pub fn shutdown(&self) -> Vec<StaleDestination> {
        let slots: Vec<Slot> = self.devices.lock().drain().map(|(_, slot)| slot).collect();
        let devices: Vec<Arc<DeviceClient>> =
            slots.iter().filter_map(|slot| slot.lock().take()).collect();
        if devices.is_empty() {
            return Vec::new();
        }

        info!("Cleaning up destinations on {} device(s)", devices.len());
        devices
            .iter()
            .flat_map(|device| device.clean_up_requested_destinations())
            .collect()
    }

    /// Connected handles. Slots whose construction failed or is still
    /// running are skipped.
    fn handles(&self) -> Vec<Arc<DeviceClient>> {
        let slots: Vec<Slot> = self.devices.lock().values().cloned().collect();
        slots.iter().filter_map(|slot| slot.lock().clone()).collect()
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
