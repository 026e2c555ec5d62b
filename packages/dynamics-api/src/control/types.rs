use crate::config::ModuleStateTable;
use crate::error::{DynamicsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Module names as they appear under `/nodes/{module}`.
pub const DYNAMICS_MODULE: &str = "rc_dynamics";
pub const SLAM_MODULE: &str = "rc_slam";

/// One entry of the device's stream catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(alias = "protobuf", alias = "messageType")]
    pub message_type: String,
}

/// A destination that is, or may still be, registered on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaleDestination {
    pub stream: String,
    pub destination: String,
}

impl fmt::Display for StaleDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.stream, self.destination)
    }
}

/// Outcome of a reconciliation pass over the device's destination lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Orphans taken off the device
    pub removed: Vec<StaleDestination>,
    /// Orphans still registered on the device
    pub remaining: Vec<StaleDestination>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Outcome of a long-running service. Negative values are failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnCode {
    pub value: i32,
    #[serde(default)]
    pub message: String,
}

impl ReturnCode {
    pub fn is_success(&self) -> bool {
        self.value >= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Running,
    Stopped,
}

impl ModuleStatus {
    pub fn from_status(status: &str) -> Self {
        if status == "running" {
            ModuleStatus::Running
        } else {
            ModuleStatus::Stopped
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Running => f.write_str("running"),
            ModuleStatus::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DestinationList {
    #[serde(default)]
    pub destinations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeStatus {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SystemInfo {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub firmware: Firmware,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Firmware {
    #[serde(default)]
    pub active_image: ActiveImage,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ActiveImage {
    #[serde(default)]
    pub image_version: String,
}

#[derive(Debug, Deserialize)]
struct ServiceEnvelope {
    response: ServiceResponse,
}

/// Newer firmware reports a named state, older firmware a numeric one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceResponse {
    Named {
        current_state: String,
        #[serde(default = "accepted_by_default")]
        accepted: bool,
    },
    Legacy {
        #[serde(rename = "enteredState")]
        entered_state: i64,
    },
}

fn accepted_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct LongRunningEnvelope {
    response: LongRunningResponse,
}

#[derive(Debug, Deserialize)]
struct LongRunningResponse {
    return_code: ReturnCode,
}

pub(crate) fn protocol_mismatch(url: &str, reason: impl fmt::Display, body: &str) -> DynamicsError {
    DynamicsError::ProtocolMismatch {
        url: url.to_string(),
        reason: reason.to_string(),
        body: body.to_string(),
    }
}

/// Decodes the state a module entered after a service call.
pub(crate) fn parse_entered_state(
    module: &str,
    service: &str,
    url: &str,
    body: &str,
    states: &ModuleStateTable,
) -> Result<String> {
    let envelope: ServiceEnvelope =
        serde_json::from_str(body).map_err(|e| protocol_mismatch(url, e, body))?;

    match envelope.response {
        ServiceResponse::Named {
            current_state,
            accepted,
        } => {
            if !states.is_known(module, &current_state) {
                return Err(DynamicsError::InvalidState {
                    module: module.to_string(),
                    state: current_state,
                });
            }
            if !accepted {
                return Err(DynamicsError::NotAccepted(service.to_string()));
            }
            Ok(current_state)
        }
        ServiceResponse::Legacy { entered_state } => Ok(entered_state.to_string()),
    }
}

pub(crate) fn parse_return_code(url: &str, body: &str) -> Result<ReturnCode> {
    serde_json::from_str::<LongRunningEnvelope>(body)
        .map(|envelope| envelope.response.return_code)
        .map_err(|e| protocol_mismatch(url, e, body))
}
