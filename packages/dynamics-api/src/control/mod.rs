pub mod client;
pub mod transport;
pub mod types;
pub mod version;

pub use client::DeviceClient;
pub use transport::{HttpTransport, Method, RestRequest, RestResponse, RestTransport};
pub use types::{
    ModuleStatus, ReconcileReport, ReturnCode, StaleDestination, StreamDescriptor, DYNAMICS_MODULE, SLAM_MODULE,
};
pub use version::{parse_firmware_version, supports_bulk_delete, BULK_DELETE_MIN_VERSION};
