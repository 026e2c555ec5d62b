//! One registered destination plus the socket it feeds.
//!
//! A session owns a [`StreamReceiver`] and talks to the device only through a
//! [`StreamRegistrar`]. Lifecycle:
//!
//! ```text
//! Created -> Registering -> AwaitingFirstData -> Active -> Closed
//!                 \                 \              \
//!                  +-----------------+--------------+--> Failed
//! ```
//!
//! A destination is removed at most once per successful registration, whether
//! teardown happens through [`StreamSession::close`], a failed start, or drop.

use crate::codec::DecoderTable;
use crate::config::ClientConfig;
use crate::error::{DynamicsError, Result};
use crate::messages::Record;
use crate::net;
use crate::receiver::StreamReceiver;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The device operations a session needs.
pub trait StreamRegistrar: Send + Sync {
    fn device_address(&self) -> Ipv4Addr;
    fn message_type_of(&self, stream: &str) -> Result<String>;
    fn add_destination(&self, stream: &str, destination: &str) -> Result<()>;
    fn remove_destination(&self, stream: &str, destination: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Registering,
    AwaitingFirstData,
    Active,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Local interface to receive on. Takes precedence over subnet matching.
    pub interface: Option<String>,
    /// Local port, 0 for any free port
    pub port: u16,
    /// Skips address resolution entirely
    pub local_address: Option<Ipv4Addr>,
    pub confirmation_timeout: Duration,
    pub poll_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl SessionOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interface: None,
            port: 0,
            local_address: None,
            confirmation_timeout: config.confirmation_timeout,
            poll_timeout: config.poll_timeout,
            buffer_size: config.receive_buffer_size,
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_local_address(mut self, address: Ipv4Addr) -> Self {
        self.local_address = Some(address);
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

pub struct StreamSession {
    registrar: Arc<dyn StreamRegistrar>,
    stream: String,
    options: SessionOptions,
    decoders: Arc<DecoderTable>,
    message_type: Option<String>,
    receiver: Option<StreamReceiver>,
    destination: Option<String>,
    registered: bool,
    state: SessionState,
    first_record: Option<Record>,
}

impl StreamSession {
    pub fn new(registrar: Arc<dyn StreamRegistrar>, stream: &str, options: SessionOptions) -> Self {
        Self {
            registrar,
            stream: stream.to_string(),
            options,
            decoders: Arc::new(DecoderTable::default()),
            message_type: None,
            receiver: None,
            destination: None,
            registered: false,
            state: SessionState::Created,
            first_record: None,
        }
    }

    /// Creates and starts a session in one step.
    pub fn open(
        registrar: Arc<dyn StreamRegistrar>,
        stream: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let mut session = Self::new(registrar, stream, options);
        session.start()?;
        Ok(session)
    }

    /// Replaces the decoders used for this session's records.
    pub fn with_decoders(mut self, decoders: Arc<DecoderTable>) -> Self {
        self.decoders = decoders;
        self
    }

    /// Registers the destination and waits for the first datagram.
    ///
    /// On any failure the session ends up `Failed` with its destination
    /// removed and its socket closed.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(self.invalid_state());
        }

        match self.try_start() {
            Ok(receiver) => {
                self.receiver = Some(receiver);
                self.state = SessionState::Active;
                info!(
                    "Stream '{}' is active on {}",
                    self.stream,
                    self.destination.as_deref().unwrap_or_default()
                );
                Ok(())
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<StreamReceiver> {
        // both checks happen before anything touches the network
        let message_type = self.registrar.message_type_of(&self.stream)?;
        self.decoders.get(&message_type)?;
        self.message_type = Some(message_type.clone());

        self.state = SessionState::Registering;
        let ip = match self.options.local_address {
            Some(ip) => ip,
            None => net::resolve(
                Some(self.registrar.device_address()),
                self.options.interface.as_deref(),
            )?,
        };
        let mut receiver = StreamReceiver::bind_with(
            ip,
            self.options.port,
            Arc::clone(&self.decoders),
            self.options.buffer_size,
        )?;
        let destination = receiver.destination();

        if let Err(e) = self.registrar.add_destination(&self.stream, &destination) {
            if e.is_reply_lost() {
                self.withdraw_unconfirmed(&destination);
            }
            return Err(e);
        }
        self.registered = true;
        self.destination = Some(destination);

        self.state = SessionState::AwaitingFirstData;
        receiver.set_timeout(self.options.confirmation_timeout)?;
        match receiver.receive_typed(&message_type)? {
            Some(record) => self.first_record = Some(record),
            None => {
                return Err(DynamicsError::UnexpectedReceiveTimeout {
                    stream: self.stream.clone(),
                    timeout_ms: self.options.confirmation_timeout.as_millis() as u64,
                })
            }
        }
        receiver.set_timeout(self.options.poll_timeout)?;

        Ok(receiver)
    }

    /// Next record, `None` when the poll timeout elapsed without data.
    pub fn receive(&mut self) -> Result<Option<Record>> {
        self.ensure_active()?;
        if let Some(record) = self.first_record.take() {
            return Ok(Some(record));
        }
        if let (Some(receiver), Some(message_type)) =
            (self.receiver.as_mut(), self.message_type.as_deref())
        {
            return receiver.receive_typed(message_type);
        }
        Err(self.closed())
    }

    /// Next datagram undecoded. Does not replay the confirmation record.
    pub fn receive_raw(&mut self) -> Result<Option<Vec<u8>>> {
        self.ensure_active()?;
        self.first_record = None;
        self.active_receiver()?.receive()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_active()?;
        self.active_receiver()?.set_timeout(timeout)
    }

    /// Removes the destination from the device and closes the socket.
    ///
    /// The socket is closed even when removal fails; the error is returned and
    /// not retried.
    pub fn close(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let result = self.deregister();
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
        self.state = SessionState::Closed;

        if let Err(e) = &result {
            warn!(
                "Could not remove destination {} of stream '{}': {}",
                self.destination.as_deref().unwrap_or_default(),
                self.stream,
                e
            );
        } else {
            debug!("Closed session for stream '{}'", self.stream);
        }
        result
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.receiver.as_ref().map(StreamReceiver::port)
    }

    fn fail(&mut self) {
        if let Err(e) = self.deregister() {
            warn!(
                "Could not remove destination {} of stream '{}' after failed start: {}",
                self.destination.as_deref().unwrap_or_default(),
                self.stream,
                e
            );
        }
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
        self.state = SessionState::Failed;
    }

    /// One removal attempt for a registration whose outcome is unknown.
    fn withdraw_unconfirmed(&self, destination: &str) {
        match self.registrar.remove_destination(&self.stream, destination) {
            Ok(()) => debug!(
                "Withdrew unconfirmed destination {} of stream '{}'",
                destination, self.stream
            ),
            Err(e) => warn!(
                "Destination {} of stream '{}' may still be registered on the device: {}",
                destination, self.stream, e
            ),
        }
    }

    fn deregister(&mut self) -> Result<()> {
        if !self.registered {
            return Ok(());
        }
        self.registered = false;
        match self.destination.as_deref() {
            Some(destination) => self.registrar.remove_destination(&self.stream, destination),
            None => Ok(()),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(self.invalid_state())
        }
    }

    fn active_receiver(&mut self) -> Result<&mut StreamReceiver> {
        let closed = self.closed();
        self.receiver.as_mut().ok_or(closed)
    }

    fn closed(&self) -> DynamicsError {
        DynamicsError::ReceiverClosed(self.destination.clone().unwrap_or_default())
    }

    fn invalid_state(&self) -> DynamicsError {
        DynamicsError::InvalidSessionState {
            stream: self.stream.clone(),
            state: self.state.to_string(),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            // close() already logs a failed removal
            let _ = self.close();
        }
    }
}
