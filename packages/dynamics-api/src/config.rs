use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_RECEIVE_BUFFER: usize = 512;

/// What to do with destinations that point at this host but were not
/// requested by this process, found when a client first talks to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Skip the scan entirely.
    Off,
    /// Log every orphan and keep it on the device.
    #[default]
    Report,
    /// Remove orphans from the device.
    Remove,
}

impl FromStr for ReconcileMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "false" | "0" => Ok(Self::Off),
            "report" | "warn" => Ok(Self::Report),
            "remove" | "clean" => Ok(Self::Remove),
            other => Err(ConfigError::InvalidValue(format!(
                "DYNAMICS_RECONCILE must be one of off, report, remove (got '{}')",
                other
            ))),
        }
    }
}

/// Known states per device module, used to validate service responses.
///
/// The device firmware owns this enumeration, so it is data rather than code:
/// the built-in table can be replaced from a JSON file of the form
/// `{"rc_dynamics": ["IDLE", "RUNNING", ...], "rc_slam": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleStateTable {
    modules: HashMap<String, BTreeSet<String>>,
}

impl Default for ModuleStateTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            "rc_dynamics",
            [
                "IDLE",
                "RUNNING",
                "STOPPING",
                "FATAL",
                "WAITING_FOR_INS",
                "WAITING_FOR_INS_AND_SLAM",
                "WAITING_FOR_SLAM",
                "RUNNING_WITH_SLAM",
                "UNKNOWN",
            ],
        );
        table.insert(
            "rc_slam",
            [
                "IDLE",
                "RUNNING",
                "FATAL",
                "WAITING_FOR_DATA",
                "RESTARTING",
                "RESETTING",
                "HALTED",
            ],
        );
        table
    }
}

impl ModuleStateTable {
    pub fn empty() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn insert<I, S>(&mut self, module: &str, states: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .extend(states.into_iter().map(Into::into));
    }

    /// Modules without an entry accept any state.
    pub fn is_known(&self, module: &str, state: &str) -> bool {
        self.modules
            .get(module)
            .map(|states| states.contains(state))
            .unwrap_or(true)
    }

    pub fn states(&self, module: &str) -> Option<&BTreeSet<String>> {
        self.modules.get(module)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "cannot read module state table {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ConfigError::InvalidValue(format!(
                "malformed module state table {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Client configuration. Every field has a default; `from_env` overrides
/// them from `DYNAMICS_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for ordinary control-plane requests
    pub request_timeout: Duration,
    /// How long a new session waits for its first datagram
    pub confirmation_timeout: Duration,
    /// Receive timeout of an active session
    pub poll_timeout: Duration,
    /// Initial datagram buffer size in bytes
    pub receive_buffer_size: usize,
    pub module_states: ModuleStateTable,
    pub reconcile: ReconcileMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            confirmation_timeout: Duration::from_millis(DEFAULT_CONFIRMATION_TIMEOUT_MS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER,
            module_states: ModuleStateTable::default(),
            reconcile: ReconcileMode::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let module_states = match lookup("DYNAMICS_MODULE_STATES") {
            Some(path) if !path.trim().is_empty() => {
                ModuleStateTable::from_json_file(Path::new(path.trim()))?
            }
            _ => ModuleStateTable::default(),
        };

        Ok(Self {
            request_timeout: millis(
                &lookup,
                "DYNAMICS_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?,
            confirmation_timeout: millis(
                &lookup,
                "DYNAMICS_CONFIRMATION_TIMEOUT_MS",
                DEFAULT_CONFIRMATION_TIMEOUT_MS,
            )?,
            poll_timeout: millis(&lookup, "DYNAMICS_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT_MS)?,
            receive_buffer_size: lookup("DYNAMICS_RECEIVE_BUFFER")
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|size| *size > 0)
                        .ok_or_else(|| {
                            ConfigError::InvalidValue(format!(
                                "DYNAMICS_RECEIVE_BUFFER must be a positive integer (got '{}')",
                                v
                            ))
                        })
                })
                .transpose()?
                .unwrap_or(DEFAULT_RECEIVE_BUFFER),
            module_states,
            reconcile: lookup("DYNAMICS_RECONCILE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn millis<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(Duration::from_millis(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "{} must be a number of milliseconds (got '{}')",
                    name, value
                ))
            }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
