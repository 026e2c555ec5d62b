use super::transport::{HttpTransport, RestRequest, RestResponse, RestTransport};
use super::types::{
    parse_entered_state, parse_return_code, protocol_mismatch, DestinationList, ModuleStatus,
    NodeStatus, ReconcileReport, ReturnCode, StaleDestination, StreamDescriptor, SystemInfo,
    DYNAMICS_MODULE, SLAM_MODULE,
};
use super::version::{parse_firmware_version, supports_bulk_delete, unknown_version};
use crate::config::{ClientConfig, ReconcileMode};
use crate::error::{DynamicsError, Result};
use crate::net;
use crate::session::{SessionOptions, StreamRegistrar, StreamSession};
use parking_lot::Mutex;
use semver::Version;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Control-plane handle for one device.
///
/// Holds the stream catalog fetched at construction and, per stream, the
/// destinations this process registered. Those tables are what cleanup works
/// from; the device's own destination lists are never assumed to match them.
pub struct DeviceClient {
    address: Ipv4Addr,
    base_url: String,
    config: ClientConfig,
    version: Version,
    catalog: Vec<StreamDescriptor>,
    requested: HashMap<String, Mutex<Vec<String>>>,
    orphans: Vec<StaleDestination>,
    transport: Arc<dyn RestTransport>,
}

impl DeviceClient {
    /// Connects over HTTP. `address` must be a dotted IPv4 address.
    pub fn connect(address: &str, config: ClientConfig) -> Result<Self> {
        let address = net::parse_ipv4(address)?;
        let transport = Arc::new(HttpTransport::new()?);
        Self::with_transport(address, transport, config)
    }

    pub fn with_transport(
        address: Ipv4Addr,
        transport: Arc<dyn RestTransport>,
        config: ClientConfig,
    ) -> Result<Self> {
        let base_url = format!("http://{}/api/v1", address);
        info!("Connecting to device at {}", base_url);

        let timeout = Some(config.request_timeout);
        let system: SystemInfo =
            fetch_json(transport.as_ref(), &format!("{}/system", base_url), timeout)?;
        let image_version = &system.firmware.active_image.image_version;
        let version = parse_firmware_version(image_version).unwrap_or_else(|| {
            warn!(
                "Could not parse firmware version '{}' of {}, assuming legacy firmware",
                image_version, address
            );
            unknown_version()
        });
        debug!("Device {} runs firmware {}", address, version);

        let catalog: Vec<StreamDescriptor> = fetch_json(
            transport.as_ref(),
            &format!("{}/datastreams", base_url),
            timeout,
        )?;
        let requested = catalog
            .iter()
            .map(|stream| (stream.name.clone(), Mutex::new(Vec::new())))
            .collect();

        let mut client = Self {
            address,
            base_url,
            config,
            version,
            catalog,
            requested,
            orphans: Vec::new(),
            transport,
        };

        let mode = client.config.reconcile;
        if mode != ReconcileMode::Off {
            match client.reconcile(&net::local_ipv4_addresses(), mode) {
                Ok(report) => client.orphans = report.remaining,
                Err(e) => warn!("Could not check {} for stale destinations: {}", address, e),
            }
        }

        Ok(client)
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn firmware_version(&self) -> &Version {
        &self.version
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn list_streams(&self) -> &[StreamDescriptor] {
        &self.catalog
    }

    /// Orphans still registered after the reconciliation pass at construction.
    pub fn orphans(&self) -> &[StaleDestination] {
        &self.orphans
    }

    pub fn check_stream_available(&self, stream: &str) -> Result<&StreamDescriptor> {
        self.catalog
            .iter()
            .find(|descriptor| descriptor.name == stream)
            .ok_or_else(|| DynamicsError::UnknownStream {
                stream: stream.to_string(),
                device: self.address.to_string(),
            })
    }

    pub fn message_type_of(&self, stream: &str) -> Result<String> {
        self.check_stream_available(stream)
            .map(|descriptor| descriptor.message_type.clone())
    }

    pub fn check_system_ready(&self) -> Result<bool> {
        let system: SystemInfo = self.get_json("/system")?;
        Ok(system.ready)
    }

    /// Destinations the device currently sends `stream` to.
    pub fn get_destinations(&self, stream: &str) -> Result<Vec<String>> {
        self.check_stream_available(stream)?;
        let list: DestinationList = self.get_json(&format!("/datastreams/{}", stream))?;
        Ok(list.destinations)
    }

    /// Destinations of `stream` this process registered and has not removed.
    pub fn requested_destinations(&self, stream: &str) -> Vec<String> {
        self.requested
            .get(stream)
            .map(|table| table.lock().clone())
            .unwrap_or_default()
    }

    pub fn add_destination(&self, stream: &str, destination: &str) -> Result<()> {
        let table = self.requested_table(stream)?;
        let mut requested = table.lock();

        let request = RestRequest::put(self.stream_url(stream))
            .query("destination", destination)
            .timeout(Some(self.config.request_timeout));
        let response = self.transport.execute(&request)?;
        if response.status == 403 {
            return Err(DynamicsError::TooManyStreamDestinations {
                url: request.url,
                message: error_message(&response.body),
            });
        }
        check_status(&request, response)?;

        requested.push(destination.to_string());
        info!("Added destination {} to stream '{}'", destination, stream);
        Ok(())
    }

    /// Removes one destination. A destination the device no longer knows is
    /// treated as removed.
    pub fn remove_destination(&self, stream: &str, destination: &str) -> Result<()> {
        let table = self.requested_table(stream)?;
        let mut requested = table.lock();

        self.delete_one(stream, destination)?;
        untrack(&mut requested, destination);
        Ok(())
    }

    /// Removes several destinations: one request on firmware that supports
    /// it, otherwise one request per destination, continuing past failures.
    pub fn remove_destinations(&self, stream: &str, destinations: &[String]) -> Result<()> {
        let table = self.requested_table(stream)?;
        if destinations.is_empty() {
            return Ok(());
        }
        let mut requested = table.lock();

        if supports_bulk_delete(&self.version) {
            let request = RestRequest::delete(self.stream_url(stream))
                .json(json!({ "destination": destinations }))
                .timeout(Some(self.config.request_timeout));
            self.send(request)?;
            for destination in destinations {
                untrack(&mut requested, destination);
            }
            info!(
                "Removed {} destination(s) from stream '{}'",
                destinations.len(),
                stream
            );
            return Ok(());
        }

        let mut failed = Vec::new();
        for destination in destinations {
            match self.delete_one(stream, destination) {
                Ok(()) => untrack(&mut requested, destination),
                Err(e) => {
                    warn!(
                        "Could not remove destination {} of stream '{}': {}",
                        destination, stream, e
                    );
                    failed.push((destination.clone(), e.to_string()));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(DynamicsError::PartialRemoval {
                stream: stream.to_string(),
                failed,
            })
        }
    }

    /// Removes everything this process registered. Returns what is still
    /// registered afterwards, each entry logged for manual removal.
    pub fn clean_up_requested_destinations(&self) -> Vec<StaleDestination> {
        for (stream, table) in &self.requested {
            let pending = table.lock().clone();
            if pending.is_empty() {
                continue;
            }
            if let Err(e) = self.remove_destinations(stream, &pending) {
                warn!("Cleanup of stream '{}' incomplete: {}", stream, e);
            }
        }

        let stale = self.all_requested();
        for entry in &stale {
            warn!(
                "Destination {} is still registered for stream '{}'. Remove it manually via {}",
                entry.destination,
                entry.stream,
                self.stream_url(&entry.stream)
            );
        }
        stale
    }

    /// Finds destinations that point at one of `local_ips` but were not
    /// registered by this process, e.g. leftovers of a crashed run.
    ///
    /// `Report` keeps them on the device; `Remove` tries to delete them and
    /// reports the ones that could not be deleted as remaining.
    pub fn reconcile(
        &self,
        local_ips: &[Ipv4Addr],
        mode: ReconcileMode,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        if mode == ReconcileMode::Off {
            return Ok(report);
        }

        let mut orphans: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for descriptor in &self.catalog {
            let tracked = self.requested_destinations(&descriptor.name);
            for destination in self.get_destinations(&descriptor.name)? {
                let Some(ip) = destination_ip(&destination) else {
                    continue;
                };
                if local_ips.contains(&ip) && !tracked.contains(&destination) {
                    orphans
                        .entry(descriptor.name.clone())
                        .or_default()
                        .push(destination);
                }
            }
        }

        for (stream, destinations) in orphans {
            let failed: Vec<String> = if mode == ReconcileMode::Remove {
                match self.remove_destinations(&stream, &destinations) {
                    Ok(()) => Vec::new(),
                    Err(DynamicsError::PartialRemoval { failed, .. }) => {
                        failed.into_iter().map(|(destination, _)| destination).collect()
                    }
                    Err(e) => {
                        warn!("Could not remove stale destinations of stream '{}': {}", stream, e);
                        destinations.clone()
                    }
                }
            } else {
                destinations.clone()
            };

            for destination in destinations {
                let entry = StaleDestination {
                    stream: stream.clone(),
                    destination,
                };
                if failed.contains(&entry.destination) {
                    report.remaining.push(entry);
                } else {
                    report.removed.push(entry);
                }
            }
        }

        if !report.removed.is_empty() {
            info!("Removed {} stale destination(s)", report.removed.len());
        }
        for orphan in &report.remaining {
            warn!(
                "Destination {} of stream '{}' points at this host but was not registered \
                 by this process. Remove it via {}",
                orphan.destination,
                orphan.stream,
                self.stream_url(&orphan.stream)
            );
        }

        Ok(report)
    }

    /// Calls a service that changes the module's state and returns the state
    /// the module reports having entered.
    pub fn call_module_service(&self, module: &str, service: &str) -> Result<String> {
        let url = self.url(&format!("/nodes/{}/services/{}", module, service));
        let response =
            self.send(RestRequest::put(&url).timeout(Some(self.config.request_timeout)))?;

        parse_entered_state(
            module,
            service,
            &url,
            &response.body,
            &self.config.module_states,
        )
        .map_err(|e| {
            error!("Could not parse response of service call {}: {}", url, e);
            e
        })
    }

    /// `timeout: None` waits as long as the device takes.
    pub fn call_long_running_service(
        &self,
        module: &str,
        service: &str,
        timeout: Option<Duration>,
    ) -> Result<ReturnCode> {
        let url = self.url(&format!("/nodes/{}/services/{}", module, service));
        let response = self.send(RestRequest::put(&url).timeout(timeout))?;
        parse_return_code(&url, &response.body)
    }

    pub fn module_status(&self, module: &str) -> Result<ModuleStatus> {
        let status: NodeStatus = self.get_json(&format!("/nodes/{}/status", module))?;
        Ok(ModuleStatus::from_status(&status.status))
    }

    pub fn dynamics_status(&self) -> Result<ModuleStatus> {
        self.module_status(DYNAMICS_MODULE)
    }

    pub fn start(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "start")
    }

    pub fn start_slam(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "start_slam")
    }

    pub fn restart(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "restart")
    }

    pub fn restart_slam(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "restart_slam")
    }

    pub fn stop(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "stop")
    }

    pub fn stop_slam(&self) -> Result<String> {
        self.call_module_service(DYNAMICS_MODULE, "stop_slam")
    }

    pub fn reset_slam(&self) -> Result<String> {
        self.call_module_service(SLAM_MODULE, "reset")
    }

    pub fn save_slam_map(&self, timeout: Option<Duration>) -> Result<ReturnCode> {
        self.call_long_running_service(SLAM_MODULE, "save_map", timeout)
    }

    pub fn load_slam_map(&self, timeout: Option<Duration>) -> Result<ReturnCode> {
        self.call_long_running_service(SLAM_MODULE, "load_map", timeout)
    }

    pub fn remove_slam_map(&self, timeout: Option<Duration>) -> Result<ReturnCode> {
        self.call_long_running_service(SLAM_MODULE, "remove_map", timeout)
    }

    /// Opens a session for `stream` and waits for its first datagram.
    pub fn create_session(
        self: &Arc<Self>,
        stream: &str,
        options: SessionOptions,
    ) -> Result<StreamSession> {
        let registrar: Arc<dyn StreamRegistrar> = Arc::clone(self) as Arc<dyn StreamRegistrar>;
        StreamSession::open(registrar, stream, options)
    }

    /// Session options seeded from this client's configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from_config(&self.config)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn send(&self, request: RestRequest) -> Result<RestResponse> {
        debug!("{} {}", request.method, request.url);
        let response = self.transport.execute(&request)?;
        check_status(&request, response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        fetch_json(
            self.transport.as_ref(),
            &self.url(path),
            Some(self.config.request_timeout),
        )
    }

    fn stream_url(&self, stream: &str) -> String {
        self.url(&format!("/datastreams/{}", stream))
    }

    fn requested_table(&self, stream: &str) -> Result<&Mutex<Vec<String>>> {
        self.check_stream_available(stream)?;
        self.requested
            .get(stream)
            .ok_or_else(|| DynamicsError::UnknownStream {
                stream: stream.to_string(),
                device: self.address.to_string(),
            })
    }

    fn delete_one(&self, stream: &str, destination: &str) -> Result<()> {
        let request = RestRequest::delete(self.stream_url(stream))
            .query("destination", destination)
            .timeout(Some(self.config.request_timeout));
        match self.send(request) {
            Ok(_) => {
                info!("Removed destination {} from stream '{}'", destination, stream);
                Ok(())
            }
            Err(DynamicsError::NotAvailable { .. }) => {
                debug!(
                    "Destination {} of stream '{}' was already gone",
                    destination, stream
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn all_requested(&self) -> Vec<StaleDestination> {
        let mut all: Vec<StaleDestination> = self
            .requested
            .iter()
            .flat_map(|(stream, table)| {
                table
                    .lock()
                    .iter()
                    .map(|destination| StaleDestination {
                        stream: stream.clone(),
                        destination: destination.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| (&a.stream, &a.destination).cmp(&(&b.stream, &b.destination)));
        all
    }
}

impl StreamRegistrar for DeviceClient {
    fn device_address(&self) -> Ipv4Addr {
        self.address
    }

    fn message_type_of(&self, stream: &str) -> Result<String> {
        DeviceClient::message_type_of(self, stream)
    }

    fn add_destination(&self, stream: &str, destination: &str) -> Result<()> {
        DeviceClient::add_destination(self, stream, destination)
    }

    fn remove_destination(&self, stream: &str, destination: &str) -> Result<()> {
        DeviceClient::remove_destination(self, stream, destination)
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        // logs whatever it could not remove
        let _ = self.clean_up_requested_destinations();
    }
}

fn fetch_json<T: DeserializeOwned>(
    transport: &dyn RestTransport,
    url: &str,
    timeout: Option<Duration>,
) -> Result<T> {
    let request = RestRequest::get(url).timeout(timeout);
    debug!("{} {}", request.method, request.url);
    let response = check_status(&request, transport.execute(&request)?)?;
    serde_json::from_str(&response.body).map_err(|e| protocol_mismatch(url, e, &response.body))
}

fn check_status(request: &RestRequest, response: RestResponse) -> Result<RestResponse> {
    if response.is_success() {
        return Ok(response);
    }
    Err(match response.status {
        404 => DynamicsError::NotAvailable {
            method: request.method.to_string(),
            url: request.url.clone(),
            body: response.body,
        },
        429 => DynamicsError::TooManyRequests {
            method: request.method.to_string(),
            url: request.url.clone(),
            body: response.body,
        },
        status => DynamicsError::Http {
            method: request.method.to_string(),
            url: request.url.clone(),
            status,
            body: response.body,
        },
    })
}

/// The device reports refusals as `{"message": "..."}`; anything else is
/// passed through verbatim.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn untrack(requested: &mut Vec<String>, destination: &str) {
    if let Some(pos) = requested.iter().position(|d| d == destination) {
        requested.remove(pos);
    }
}

fn destination_ip(destination: &str) -> Option<Ipv4Addr> {
    destination
        .parse::<SocketAddrV4>()
        .ok()
        .map(|addr| *addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"message": "maximum of 10 destinations reached"}"#),
            "maximum of 10 destinations reached"
        );
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_untrack_removes_one_occurrence() {
        let mut requested = vec![
            "10.0.0.2:30000".to_string(),
            "10.0.0.2:30001".to_string(),
            "10.0.0.2:30000".to_string(),
        ];
        untrack(&mut requested, "10.0.0.2:30000");
        assert_eq!(requested, vec!["10.0.0.2:30001", "10.0.0.2:30000"]);
        untrack(&mut requested, "10.0.0.9:1");
        assert_eq!(requested.len(), 2);
    }

    #[test]
    fn test_destination_ip() {
        assert_eq!(
            destination_ip("192.168.0.17:30000"),
            Some(Ipv4Addr::new(192, 168, 0, 17))
        );
        assert_eq!(destination_ip("garbage"), None);
    }

    #[test]
    fn test_status_mapping() {
        let request = RestRequest::get("http://10.0.0.1/api/v1/datastreams/pose");
        let not_found = check_status(
            &request,
            RestResponse::new(404, r#"{"message":"node rc_dynamics not installed"}"#),
        )
        .unwrap_err();
        assert!(matches!(not_found, DynamicsError::NotAvailable { .. }));
        let msg = not_found.to_string();
        assert!(msg.contains("GET http://10.0.0.1/api/v1/datastreams/pose"));
        assert!(msg.contains("node rc_dynamics not installed"));

        let limited = check_status(&request, RestResponse::new(429, "slow down, retry in 3s"))
            .unwrap_err();
        assert!(matches!(limited, DynamicsError::TooManyRequests { .. }));
        assert!(limited.to_string().contains("slow down, retry in 3s"));

        match check_status(&request, RestResponse::new(500, "oops")) {
            Err(DynamicsError::Http { status, body, method, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
                assert_eq!(method, "GET");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
