// UDP receiver for device data streams
//
// Binds a local socket the device can send datagrams to. Each datagram holds
// exactly one encoded message of the stream's type.

use crate::codec::DecoderTable;
use crate::config::DEFAULT_RECEIVE_BUFFER;
use crate::error::{DynamicsError, Result};
use crate::messages::Record;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct StreamReceiver {
    socket: Option<UdpSocket>,
    local_addr: SocketAddrV4,
    buffer: Vec<u8>,
    decoders: Arc<DecoderTable>,
}

impl StreamReceiver {
    /// Binds to `ip:port`. Port 0 lets the OS pick a free port.
    pub fn bind(ip: Ipv4Addr, port: u16) -> Result<Self> {
        Self::bind_with(
            ip,
            port,
            Arc::new(DecoderTable::default()),
            DEFAULT_RECEIVE_BUFFER,
        )
    }

    pub fn bind_with(
        ip: Ipv4Addr,
        port: u16,
        decoders: Arc<DecoderTable>,
        buffer_size: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(ip, port)).map_err(|source| {
            DynamicsError::Socket {
                context: format!("binding UDP socket to {}:{}", ip, port),
                source,
            }
        })?;
        let bound_port = socket
            .local_addr()
            .map_err(|source| DynamicsError::Socket {
                context: "reading local socket address".to_string(),
                source,
            })?
            .port();
        let local_addr = SocketAddrV4::new(ip, bound_port);

        info!("Receiving stream datagrams on {}", local_addr);

        Ok(Self {
            socket: Some(socket),
            local_addr,
            buffer: vec![0u8; buffer_size.max(1)],
            decoders,
        })
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.local_addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// `ip:port` as registered with the device.
    pub fn destination(&self) -> String {
        self.local_addr.to_string()
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Zero means a receive returns immediately when nothing is queued.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let socket = self.socket()?;
        let result = if timeout.is_zero() {
            socket.set_nonblocking(true)
        } else {
            socket
                .set_nonblocking(false)
                .and_then(|_| socket.set_read_timeout(Some(timeout)))
        };
        result.map_err(|source| DynamicsError::Socket {
            context: format!("setting receive timeout on {}", self.local_addr),
            source,
        })
    }

    /// Next datagram as raw bytes, `None` when the timeout elapsed first.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.recv_len()?.map(|len| self.buffer[..len].to_vec()))
    }

    /// Next datagram decoded as `message_type`.
    ///
    /// An unsupported type fails before the socket is read, so no datagram is
    /// consumed.
    pub fn receive_typed(&mut self, message_type: &str) -> Result<Option<Record>> {
        let decoder = *self.decoders.get(message_type)?;
        if self.buffer.len() < decoder.buffer_hint {
            self.buffer.resize(decoder.buffer_hint, 0);
        }

        match self.recv_len()? {
            None => Ok(None),
            Some(len) => (decoder.decode)(&self.buffer[..len])
                .map(Some)
                .map_err(|source| DynamicsError::Decode {
                    message_type: message_type.to_string(),
                    source,
                }),
        }
    }

    /// Releases the socket. Safe to call more than once.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed stream receiver on {}", self.local_addr);
        }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| DynamicsError::ReceiverClosed(self.destination()))
    }

    fn recv_len(&mut self) -> Result<Option<usize>> {
        let socket = match self.socket.as_ref() {
            Some(socket) => socket,
            None => return Err(DynamicsError::ReceiverClosed(self.local_addr.to_string())),
        };

        loop {
            match socket.recv(&mut self.buffer) {
                Ok(len) => return Ok(Some(len)),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(DynamicsError::Socket {
                        context: format!("receiving on {}", self.local_addr),
                        source,
                    })
                }
            }
        }
    }
}
