use crate::config::ConfigError;
use thiserror::Error;

/// Coarse classification of a [`DynamicsError`], used by callers to decide
/// between aborting, reporting a usage problem, or warning about leftovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid address, unknown stream, no usable local interface. Never retried.
    Configuration,
    /// Non-success control-plane response, socket or connection failure.
    Transport,
    /// Bounded wait elapsed where data was required.
    Timeout,
    /// The device answered in a shape this client does not understand.
    Protocol,
    /// Best-effort teardown could not remove everything it registered.
    Cleanup,
}

#[derive(Error, Debug)]
pub enum DynamicsError {
    #[error("Given IP address is not a valid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Stream of type '{stream}' is not available on device {device}")]
    UnknownStream { stream: String, device: String },

    #[error(
        "Could not infer a valid local IP address as stream destination \
         (interface: '{interface}', peer: {peer})"
    )]
    NoLocalAddress { interface: String, peer: String },

    #[error("Unsupported message type '{requested}'. Supported types: {supported}")]
    UnsupportedMessageType { requested: String, supported: String },

    #[error("Session for stream '{stream}' cannot do this in state {state}")]
    InvalidSessionState { stream: String, state: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{method} {url} failed with HTTP status {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Requested resource is not available on device (HTTP 404): {method} {url}: {body}")]
    NotAvailable {
        method: String,
        url: String,
        body: String,
    },

    #[error("Device returned HTTP 429 (too many requests): {method} {url}: {body}")]
    TooManyRequests {
        method: String,
        url: String,
        body: String,
    },

    #[error("Device refused another stream destination (HTTP 403) for {url}: {message}")]
    TooManyStreamDestinations { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Socket error while {context}: {source}")]
    Socket {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Receiver bound to {0} is closed")]
    ReceiverClosed(String),

    #[error(
        "Ran into unexpected receive timeout ({timeout_ms} ms) waiting for the first '{stream}' message. \
         Possible reasons: the producing module on the device is not running, the device cannot \
         estimate its state, or datagrams sent by the device do not reach this host"
    )]
    UnexpectedReceiveTimeout { stream: String, timeout_ms: u64 },

    #[error("Invalid state encountered for module {module}: {state}")]
    InvalidState { module: String, state: String },

    #[error("Service call not accepted: {0}")]
    NotAccepted(String),

    #[error("Unrecognized response from {url} ({reason}): {body}")]
    ProtocolMismatch {
        url: String,
        reason: String,
        body: String,
    },

    #[error("Failed to decode {message_type} message: {source}")]
    Decode {
        message_type: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Could not remove destination(s) of stream '{stream}': {}", format_failures(.failed))]
    PartialRemoval {
        stream: String,
        failed: Vec<(String, String)>,
    },
}

impl DynamicsError {
    /// The request failed without a status from the device, so the device
    /// may still have applied it.
    pub fn is_reply_lost(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Socket { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_)
            | Self::UnknownStream { .. }
            | Self::NoLocalAddress { .. }
            | Self::UnsupportedMessageType { .. }
            | Self::InvalidSessionState { .. }
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Http { .. }
            | Self::NotAvailable { .. }
            | Self::TooManyRequests { .. }
            | Self::TooManyStreamDestinations { .. }
            | Self::Request { .. }
            | Self::HttpClient(_)
            | Self::Socket { .. }
            | Self::ReceiverClosed(_) => ErrorKind::Transport,
            Self::UnexpectedReceiveTimeout { .. } => ErrorKind::Timeout,
            Self::InvalidState { .. }
            | Self::NotAccepted(_)
            | Self::ProtocolMismatch { .. }
            | Self::Decode { .. } => ErrorKind::Protocol,
            Self::PartialRemoval { .. } => ErrorKind::Cleanup,
        }
    }
}

fn format_failures(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(destination, reason)| format!("{} ({})", destination, reason))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, DynamicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        let unknown = DynamicsError::UnknownStream {
            stream: "gyro".to_string(),
            device: "10.0.0.1".to_string(),
        };
        assert_eq!(unknown.kind(), ErrorKind::Configuration);

        let http = DynamicsError::Http {
            method: "PUT".to_string(),
            url: "http://10.0.0.1/api/v1/datastreams/pose".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(http.kind(), ErrorKind::Transport);

        let invalid = DynamicsError::InvalidState {
            module: "rc_dynamics".to_string(),
            state: "DANCING".to_string(),
        };
        assert_eq!(invalid.kind(), ErrorKind::Protocol);

        let timeout = DynamicsError::UnexpectedReceiveTimeout {
            stream: "pose".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_only_statusless_failures_lose_the_reply() {
        let socket = DynamicsError::Socket {
            context: "reading response".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
        };
        assert!(socket.is_reply_lost());

        let limited = DynamicsError::TooManyRequests {
            method: "PUT".to_string(),
            url: "http://10.0.0.1/api/v1/datastreams/pose".to_string(),
            body: String::new(),
        };
        assert!(!limited.is_reply_lost());
        assert!(!DynamicsError::TooManyStreamDestinations {
            url: "http://10.0.0.1/api/v1/datastreams/pose".to_string(),
            message: "full".to_string(),
        }
        .is_reply_lost());
    }

    #[test]
    fn test_http_error_mentions_url_and_body() {
        let err = DynamicsError::Http {
            method: "DELETE".to_string(),
            url: "http://10.0.0.1/api/v1/datastreams/imu".to_string(),
            status: 400,
            body: "bad destination".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/datastreams/imu"));
        assert!(msg.contains("bad destination"));
        assert!(msg.contains("400"));
    }

    #[test]
    fn test_partial_removal_lists_every_destination() {
        let err = DynamicsError::PartialRemoval {
            stream: "pose".to_string(),
            failed: vec![
                ("10.0.0.2:30000".to_string(), "timeout".to_string()),
                ("10.0.0.2:30001".to_string(), "HTTP 500".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.2:30000 (timeout)"));
        assert!(msg.contains("10.0.0.2:30001 (HTTP 500)"));
        assert_eq!(err.kind(), ErrorKind::Cleanup);
    }
}
