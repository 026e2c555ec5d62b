//! Message types sent by the device on its data streams.
//!
//! These mirror the device's protocol buffer definitions. Field tags must stay
//! in sync with the firmware; everything else about the Rust side is free.

use prost::Message;
use serde::{Deserialize, Serialize};

/// Seconds and nanoseconds since the Unix epoch, as stamped by the device.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Time {
    #[prost(int32, tag = "1")]
    pub sec: i32,
    #[prost(int32, tag = "2")]
    pub nsec: i32,
}

impl Time {
    pub fn new(sec: i32, nsec: i32) -> Self {
        Self { sec, nsec }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.sec) + f64::from(self.nsec) * 1e-9
    }
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Vector3d {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Quaternion {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(double, tag = "4")]
    pub w: f64,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    #[prost(message, optional, tag = "1")]
    pub position: Option<Vector3d>,
    #[prost(message, optional, tag = "2")]
    pub orientation: Option<Quaternion>,
    /// Row-major 6x6 covariance, empty when the producer does not provide one
    #[prost(double, repeated, tag = "3")]
    pub covariance: Vec<f64>,
}

#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseStamped {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Time>,
    #[prost(message, optional, tag = "2")]
    pub pose: Option<Pose>,
}

/// A pose of frame `name` relative to frame `parent`.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    #[prost(string, tag = "1")]
    pub parent: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, optional, tag = "3")]
    pub pose: Option<PoseStamped>,
    #[prost(string, tag = "4")]
    pub producer: String,
}

/// Raw inertial measurement.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Imu {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Time>,
    #[prost(message, optional, tag = "2")]
    pub linear_acceleration: Option<Vector3d>,
    #[prost(message, optional, tag = "3")]
    pub angular_velocity: Option<Vector3d>,
}

/// Full dynamic state estimate, including the module's state machine.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Dynamics {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Time>,
    #[prost(message, optional, tag = "2")]
    pub pose: Option<Pose>,
    #[prost(string, tag = "3")]
    pub pose_frame: String,
    #[prost(message, optional, tag = "4")]
    pub linear_velocity: Option<Vector3d>,
    #[prost(string, tag = "5")]
    pub linear_velocity_frame: String,
    #[prost(message, optional, tag = "6")]
    pub angular_velocity: Option<Vector3d>,
    #[prost(string, tag = "7")]
    pub angular_velocity_frame: String,
    #[prost(message, optional, tag = "8")]
    pub linear_acceleration: Option<Vector3d>,
    #[prost(string, tag = "9")]
    pub linear_acceleration_frame: String,
    #[prost(double, repeated, tag = "10")]
    pub covariance: Vec<f64>,
    #[prost(message, optional, tag = "11")]
    pub cam2imu_transform: Option<Frame>,
    #[prost(string, repeated, tag = "12")]
    pub possible_states: Vec<String>,
    #[prost(string, tag = "13")]
    pub current_state: String,
}

/// Sequence of stamped poses, returned by the SLAM module on request.
#[derive(Clone, PartialEq, Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Trajectory {
    #[prost(string, tag = "1")]
    pub parent: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub producer: String,
    #[prost(message, optional, tag = "4")]
    pub timestamp: Option<Time>,
    #[prost(message, repeated, tag = "5")]
    pub poses: Vec<PoseStamped>,
}

/// One decoded datagram.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Record {
    Frame(Frame),
    Imu(Imu),
    Dynamics(Dynamics),
}

impl Record {
    pub fn type_name(&self) -> &'static str {
        match self {
            Record::Frame(_) => "Frame",
            Record::Imu(_) => "Imu",
            Record::Dynamics(_) => "Dynamics",
        }
    }

    pub fn timestamp(&self) -> Option<&Time> {
        match self {
            Record::Frame(frame) => frame.pose.as_ref().and_then(|p| p.timestamp.as_ref()),
            Record::Imu(imu) => imu.timestamp.as_ref(),
            Record::Dynamics(dynamics) => dynamics.timestamp.as_ref(),
        }
    }
}
