pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod messages;
pub mod net;
pub mod receiver;
pub mod registry;
pub mod session;
pub mod trajectory;

pub use codec::{Decoder, DecoderTable};
pub use config::{ClientConfig, ConfigError, ModuleStateTable, ReconcileMode};
pub use control::{
    DeviceClient, ModuleStatus, ReconcileReport, ReturnCode, StaleDestination, StreamDescriptor,
    DYNAMICS_MODULE, SLAM_MODULE,
};
pub use error::{DynamicsError, ErrorKind, Result};
pub use messages::Record;
pub use receiver::StreamReceiver;
pub use registry::DeviceRegistry;
pub use session::{SessionOptions, SessionState, StreamRegistrar, StreamSession};
pub use trajectory::TrajectoryTime;
