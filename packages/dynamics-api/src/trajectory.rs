use crate::control::types::{protocol_mismatch, SLAM_MODULE};
use crate::control::{DeviceClient, RestRequest};
use crate::error::Result;
use crate::messages::Trajectory;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// A point in time for a trajectory query.
///
/// Relative times are offsets into the recorded trajectory: positive values
/// count from its start, negative values back from its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryTime {
    pub sec: i64,
    pub nsec: i64,
    pub relative: bool,
}

impl TrajectoryTime {
    pub fn absolute(sec: i64, nsec: i64) -> Self {
        Self {
            sec,
            nsec,
            relative: false,
        }
    }

    pub fn relative_to_start(sec: i64, nsec: i64) -> Self {
        Self {
            sec,
            nsec,
            relative: true,
        }
    }

    pub fn relative_to_end(sec: i64, nsec: i64) -> Self {
        Self {
            sec: -sec,
            nsec: -nsec,
            relative: true,
        }
    }

    /// The very start of the trajectory
    pub fn start() -> Self {
        Self::relative_to_start(0, 0)
    }

    /// The very end of the trajectory
    pub fn end() -> Self {
        Self::relative_to_end(0, 0)
    }

    fn stamp(&self) -> Value {
        json!({ "sec": self.sec, "nsec": self.nsec })
    }
}

pub(crate) fn trajectory_request_body(start: &TrajectoryTime, end: &TrajectoryTime) -> Value {
    let mut args = Map::new();
    args.insert("start_time".to_string(), start.stamp());
    args.insert("end_time".to_string(), end.stamp());
    if start.relative {
        args.insert("start_time_relative".to_string(), Value::Bool(true));
    }
    if end.relative {
        args.insert("end_time_relative".to_string(), Value::Bool(true));
    }
    json!({ "args": args })
}

#[derive(Deserialize)]
struct TrajectoryEnvelope {
    response: TrajectoryResponse,
}

#[derive(Deserialize)]
struct TrajectoryResponse {
    trajectory: Trajectory,
}

impl DeviceClient {
    /// Queries the SLAM module for the poses recorded between `start` and
    /// `end`. `timeout: None` waits as long as the device takes.
    pub fn get_slam_trajectory(
        &self,
        start: &TrajectoryTime,
        end: &TrajectoryTime,
        timeout: Option<Duration>,
    ) -> Result<Trajectory> {
        let url = self.url(&format!("/nodes/{}/services/get_trajectory", SLAM_MODULE));
        let request = RestRequest::put(&url)
            .json(trajectory_request_body(start, end))
            .timeout(timeout);
        let response = self.send(request)?;

        let envelope: TrajectoryEnvelope = serde_json::from_str(&response.body)
            .map_err(|e| protocol_mismatch(&url, e, &response.body))?;
        debug!(
            "Received trajectory with {} poses",
            envelope.response.trajectory.poses.len()
        );
        Ok(envelope.response.trajectory)
    }
}
