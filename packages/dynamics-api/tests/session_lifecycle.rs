mod common;

use common::{connect, frame_payload, local_options, quiet_config, sample_frame, MockDevice};
use dynamics_api::control::{Method, RestRequest, RestResponse, RestTransport};
use dynamics_api::messages::{Imu, Time};
use dynamics_api::{DeviceClient, DynamicsError, ErrorKind, Record, SessionState, StreamSession};
use prost::Message;
use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

const CATALOG: &[(&str, &str)] = &[("pose", "Frame"), ("imu", "Imu")];

#[test]
fn test_known_stream_becomes_active_after_first_datagram() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let mut session = device.create_session("pose", local_options()).unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.message_type(), Some("Frame"));
    let destination = session.destination().unwrap().to_string();
    assert_eq!(mock.destinations("pose"), vec![destination.clone()]);
    assert_eq!(device.requested_destinations("pose"), vec![destination]);

    // the confirmation datagram is handed out first
    assert_eq!(
        session.receive().unwrap(),
        Some(Record::Frame(sample_frame()))
    );
    assert_eq!(session.receive().unwrap(), None);
}

#[test]
fn test_unknown_stream_fails_without_network_calls() {
    let mock = MockDevice::modern(CATALOG);
    let device = connect(&mock);
    mock.clear_calls();

    let err = device.create_session("gyro", local_options()).err().unwrap();

    assert!(matches!(err, DynamicsError::UnknownStream { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(mock.calls().is_empty());
}

#[test]
fn test_silent_stream_fails_and_leaves_nothing_registered() {
    let mock = MockDevice::modern(CATALOG);
    let device = connect(&mock);
    let options = local_options().with_confirmation_timeout(Duration::from_millis(100));

    let mut session = StreamSession::new(device.clone(), "imu", options);
    let err = session.start().unwrap_err();

    assert!(matches!(err, DynamicsError::UnexpectedReceiveTimeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(session.state(), SessionState::Failed);
    assert!(mock.destinations("imu").is_empty());
    assert!(device.requested_destinations("imu").is_empty());
    assert_eq!(mock.count(Method::Put, "/datastreams/imu"), 1);
    assert_eq!(mock.count(Method::Delete, "/datastreams/imu"), 1);

    drop(session);
    assert_eq!(mock.count(Method::Delete, "/datastreams/imu"), 1);
}

#[test]
fn test_refused_registration_fails_without_removal() {
    let mock = MockDevice::modern(CATALOG);
    mock.respond(Method::Put, "/datastreams/pose", 429, "");
    let device = connect(&mock);

    let mut session = StreamSession::new(device.clone(), "pose", local_options());
    assert!(matches!(
        session.start(),
        Err(DynamicsError::TooManyRequests { .. })
    ));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.count(Method::Delete, "/datastreams/pose"), 0);
}

/// Applies every request on the mock device but loses the reply to
/// destination registrations.
struct LostRegistrationReply(Arc<MockDevice>);

impl RestTransport for LostRegistrationReply {
    fn execute(&self, request: &RestRequest) -> dynamics_api::Result<RestResponse> {
        let response = self.0.execute(request)?;
        if request.method == Method::Put && request.url.contains("/datastreams/") {
            return Err(DynamicsError::Socket {
                context: "reading response".to_string(),
                source: io::Error::new(io::ErrorKind::TimedOut, "timed out"),
            });
        }
        Ok(response)
    }
}

#[test]
fn test_lost_registration_reply_leaves_nothing_registered() {
    let mock = MockDevice::modern(CATALOG);
    let transport: Arc<dyn RestTransport> = Arc::new(LostRegistrationReply(mock.clone()));
    let device = Arc::new(
        DeviceClient::with_transport(Ipv4Addr::LOCALHOST, transport, quiet_config()).unwrap(),
    );

    let mut session = StreamSession::new(device.clone(), "pose", local_options());
    let err = session.start().unwrap_err();

    assert!(matches!(err, DynamicsError::Socket { .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(session.state(), SessionState::Failed);
    assert!(mock.destinations("pose").is_empty());
    assert_eq!(mock.count(Method::Delete, "/datastreams/pose"), 1);

    drop(session);
    drop(device);
    assert_eq!(mock.count(Method::Delete, "/datastreams/pose"), 1);
}

#[test]
fn test_drop_after_active_removes_exactly_once() {
    let mock = MockDevice::legacy(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let session = device.create_session("pose", local_options()).unwrap();
    let destination = session.destination().unwrap().to_string();
    drop(session);

    assert_eq!(mock.deletes_of(&destination), 1);
    assert!(mock.destinations("pose").is_empty());

    // the device handle has nothing left to clean up
    drop(device);
    assert_eq!(mock.deletes_of(&destination), 1);
}

#[test]
fn test_close_then_drop_removes_exactly_once() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let mut session = device.create_session("pose", local_options()).unwrap();
    let destination = session.destination().unwrap().to_string();

    session.close().unwrap();
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.receive().is_err());
    drop(session);

    assert_eq!(mock.deletes_of(&destination), 1);
}

#[test]
fn test_failed_removal_on_close_is_reported_once() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let mut session = device.create_session("pose", local_options()).unwrap();
    let destination = session.destination().unwrap().to_string();
    mock.fail_delete_of(&destination);

    let err = session.close().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.local_port().is_none());
    drop(session);
    assert_eq!(mock.deletes_of(&destination), 1);

    // still tracked by the handle, so cleanup can report it
    assert_eq!(device.requested_destinations("pose"), vec![destination]);
}

#[test]
fn test_records_after_confirmation() {
    let first = Imu {
        timestamp: Some(Time::new(10, 0)),
        ..Default::default()
    };
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("imu", first.encode_to_vec());
    let device = connect(&mock);

    let mut session = device.create_session("imu", local_options()).unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for sec in 11..14 {
        let imu = Imu {
            timestamp: Some(Time::new(sec, 0)),
            ..Default::default()
        };
        sender
            .send_to(&imu.encode_to_vec(), session.destination().unwrap())
            .unwrap();
    }

    let mut seconds = Vec::new();
    while let Some(record) = session.receive().unwrap() {
        seconds.push(record.timestamp().map(|t| t.sec).unwrap_or_default());
    }
    assert_eq!(seconds, vec![10, 11, 12, 13]);
}

#[test]
fn test_zero_poll_timeout_returns_immediately() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let mut session = device
        .create_session("pose", local_options().with_poll_timeout(Duration::ZERO))
        .unwrap();
    assert!(session.receive_raw().unwrap().is_none());
    session.set_timeout(Duration::from_millis(10)).unwrap();
    assert!(session.receive().unwrap().is_none());
}

#[test]
fn test_wrong_payload_type_is_a_decode_error() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("imu", vec![0xff, 0xff, 0xff, 0xff]);
    let device = connect(&mock);

    let err = device.create_session("imu", local_options()).err().unwrap();
    assert!(matches!(err, DynamicsError::Decode { .. }));
    assert!(mock.destinations("imu").is_empty());
}

#[test]
fn test_sessions_share_the_handle() {
    let mock = MockDevice::modern(CATALOG);
    mock.emit_on_add("pose", frame_payload());
    let device = connect(&mock);

    let a = device.create_session("pose", local_options()).unwrap();
    let b = device.create_session("pose", local_options()).unwrap();
    assert_ne!(a.destination(), b.destination());
    assert_eq!(mock.destinations("pose").len(), 2);
    assert_eq!(Arc::strong_count(&device), 3);

    drop(a);
    assert_eq!(mock.destinations("pose"), vec![b.destination().unwrap().to_string()]);
}
