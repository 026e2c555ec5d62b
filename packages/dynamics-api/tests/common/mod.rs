#![allow(dead_code)]

use dynamics_api::control::{Method, RestRequest, RestResponse, RestTransport};
use dynamics_api::messages::{Frame, Pose, PoseStamped, Quaternion, Time, Vector3d};
use dynamics_api::{ClientConfig, DeviceClient, ReconcileMode, Result, SessionOptions};
use parking_lot::Mutex;
use prost::Message;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

pub const MODERN_FIRMWARE: &str = "rc_visard_v1.7.0";
pub const LEGACY_FIRMWARE: &str = "rc_visard_v1.6.2";

#[derive(Default)]
struct MockState {
    image_version: String,
    ready: bool,
    catalog: Vec<(String, String)>,
    destinations: HashMap<String, Vec<String>>,
    emit_on_add: HashMap<String, Vec<u8>>,
    responses: HashMap<(Method, String), (u16, String)>,
    failing_deletes: HashSet<String>,
    node_status: HashMap<String, String>,
    calls: Vec<RestRequest>,
}

/// In-memory device control plane. Optionally sends a datagram to every
/// destination registered for a stream, like a device that is producing data.
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new(image_version: &str, catalog: &[(&str, &str)]) -> Arc<Self> {
        let state = MockState {
            image_version: image_version.to_string(),
            ready: true,
            catalog: catalog
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
            destinations: catalog
                .iter()
                .map(|(name, _)| (name.to_string(), Vec::new()))
                .collect(),
            ..Default::default()
        };
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn modern(catalog: &[(&str, &str)]) -> Arc<Self> {
        Self::new(MODERN_FIRMWARE, catalog)
    }

    pub fn legacy(catalog: &[(&str, &str)]) -> Arc<Self> {
        Self::new(LEGACY_FIRMWARE, catalog)
    }

    pub fn emit_on_add(&self, stream: &str, payload: Vec<u8>) {
        self.state
            .lock()
            .emit_on_add
            .insert(stream.to_string(), payload);
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn set_destinations(&self, stream: &str, destinations: &[&str]) {
        self.state.lock().destinations.insert(
            stream.to_string(),
            destinations.iter().map(|d| d.to_string()).collect(),
        );
    }

    pub fn destinations(&self, stream: &str) -> Vec<String> {
        self.state
            .lock()
            .destinations
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_node_status(&self, module: &str, status: &str) {
        self.state
            .lock()
            .node_status
            .insert(module.to_string(), status.to_string());
    }

    /// Canned answer for `method` on `path` (relative to `/api/v1`).
    pub fn respond(&self, method: Method, path: &str, status: u16, body: &str) {
        self.state
            .lock()
            .responses
            .insert((method, path.to_string()), (status, body.to_string()));
    }

    pub fn fail_delete_of(&self, destination: &str) {
        self.state
            .lock()
            .failing_deletes
            .insert(destination.to_string());
    }

    pub fn calls(&self) -> Vec<RestRequest> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && path_of(&call.url) == path)
            .count()
    }

    /// DELETE requests naming `destination`, either as query or in a bulk body.
    pub fn deletes_of(&self, destination: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == Method::Delete)
            .filter(|call| {
                call.query_value("destination") == Some(destination)
                    || call
                        .body
                        .as_ref()
                        .and_then(|b| b["destination"].as_array().cloned())
                        .map(|list| list.iter().any(|d| d == destination))
                        .unwrap_or(false)
            })
            .count()
    }

    fn handle(&self, request: &RestRequest) -> RestResponse {
        let mut state = self.state.lock();
        state.calls.push(request.clone());

        let path = path_of(&request.url).to_string();
        if let Some((status, body)) = state.responses.get(&(request.method, path.clone())) {
            return RestResponse::new(*status, body.clone());
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["system"]) => ok(json!({
                "ready": state.ready,
                "firmware": {"active_image": {"image_version": state.image_version}},
            })),
            (Method::Get, ["datastreams"]) => ok(Value::Array(
                state
                    .catalog
                    .iter()
                    .map(|(name, ty)| json!({"name": name, "protobuf": ty}))
                    .collect(),
            )),
            (method, ["datastreams", stream]) => {
                let stream = stream.to_string();
                if !state.destinations.contains_key(&stream) {
                    return not_found();
                }
                match method {
                    Method::Get => ok(json!({
                        "name": stream,
                        "destinations": state.destinations[&stream],
                    })),
                    Method::Put => {
                        let Some(destination) = request.query_value("destination") else {
                            return RestResponse::new(400, "missing destination");
                        };
                        if let Some(entry) = state.destinations.get_mut(&stream) {
                            entry.push(destination.to_string());
                        }
                        if let Some(payload) = state.emit_on_add.get(&stream) {
                            emit(payload, destination);
                        }
                        ok(json!({"destinations": state.destinations[&stream]}))
                    }
                    Method::Delete => {
                        let requested: Vec<String> = match request.query_value("destination") {
                            Some(destination) => vec![destination.to_string()],
                            None => request
                                .body
                                .as_ref()
                                .and_then(|b| b["destination"].as_array().cloned())
                                .unwrap_or_default()
                                .iter()
                                .filter_map(|d| d.as_str().map(str::to_string))
                                .collect(),
                        };
                        if requested.iter().any(|d| state.failing_deletes.contains(d)) {
                            return RestResponse::new(500, "internal error");
                        }
                        let Some(entry) = state.destinations.get_mut(&stream) else {
                            return not_found();
                        };
                        if request.query.is_empty() {
                            entry.retain(|d| !requested.contains(d));
                        } else {
                            match entry.iter().position(|d| *d == requested[0]) {
                                Some(pos) => {
                                    entry.remove(pos);
                                }
                                None => return not_found(),
                            }
                        }
                        ok(json!({"destinations": entry.clone()}))
                    }
                }
            }
            (Method::Get, ["nodes", module, "status"]) => ok(json!({
                "status": state
                    .node_status
                    .get(*module)
                    .cloned()
                    .unwrap_or_else(|| "running".to_string()),
            })),
            _ => not_found(),
        }
    }
}

impl RestTransport for MockDevice {
    fn execute(&self, request: &RestRequest) -> Result<RestResponse> {
        Ok(self.handle(request))
    }
}

fn path_of(url: &str) -> &str {
    url.split_once("/api/v1").map(|(_, path)| path).unwrap_or(url)
}

fn ok(body: Value) -> RestResponse {
    RestResponse::new(200, body.to_string())
}

fn not_found() -> RestResponse {
    RestResponse::new(404, r#"{"message": "not found"}"#)
}

fn emit(payload: &[u8], destination: &str) {
    if let Ok(socket) = UdpSocket::bind("127.0.0.1:0") {
        let _ = socket.send_to(payload, destination);
    }
}

pub fn quiet_config() -> ClientConfig {
    ClientConfig {
        reconcile: ReconcileMode::Off,
        ..Default::default()
    }
}

pub fn connect(mock: &Arc<MockDevice>) -> Arc<DeviceClient> {
    connect_with(mock, quiet_config())
}

pub fn connect_with(mock: &Arc<MockDevice>, config: ClientConfig) -> Arc<DeviceClient> {
    let transport: Arc<dyn RestTransport> = mock.clone();
    Arc::new(DeviceClient::with_transport(Ipv4Addr::LOCALHOST, transport, config).unwrap())
}

pub fn local_options() -> SessionOptions {
    SessionOptions::default()
        .with_local_address(Ipv4Addr::LOCALHOST)
        .with_confirmation_timeout(Duration::from_millis(500))
        .with_poll_timeout(Duration::from_millis(50))
}

pub fn sample_frame() -> Frame {
    Frame {
        parent: "world".to_string(),
        name: "rcvisard".to_string(),
        pose: Some(PoseStamped {
            timestamp: Some(Time::new(1_700_000_000, 42)),
            pose: Some(Pose {
                position: Some(Vector3d {
                    x: 0.5,
                    y: -0.25,
                    z: 1.0,
                }),
                orientation: Some(Quaternion {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    w: 1.0,
                }),
                covariance: Vec::new(),
            }),
        }),
        producer: "slam".to_string(),
    }
}

pub fn frame_payload() -> Vec<u8> {
    sample_frame().encode_to_vec()
}
