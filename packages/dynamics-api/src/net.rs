//! Local address selection for stream destinations.
//!
//! The device needs an address it can reach this host on. Selection works on
//! a snapshot of the host's IPv4 interfaces; [`resolve_from`] is the pure part
//! and [`resolve`] feeds it the live table from `if_addrs`.

use crate::error::{DynamicsError, Result};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Interface name prefixes considered when neither an interface name nor a
/// peer address narrows the choice.
const INTERFACE_NAME_PREFIXES: &[&str] = &["eth", "en", "wl", "wlan", "wlp", "enp", "eno", "ens"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl InterfaceAddr {
    pub fn new(name: &str, ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            name: name.to_string(),
            ip,
            netmask,
        }
    }

    pub fn contains(&self, peer: Ipv4Addr) -> bool {
        is_in_subnet(peer, self.ip, self.netmask)
    }
}

pub fn is_in_subnet(ip: Ipv4Addr, network: Ipv4Addr, netmask: Ipv4Addr) -> bool {
    let mask = u32::from(netmask);
    u32::from(ip) & mask == u32::from(network) & mask
}

pub fn parse_ipv4(address: &str) -> Result<Ipv4Addr> {
    address
        .trim()
        .parse()
        .map_err(|_| DynamicsError::InvalidAddress(address.to_string()))
}

/// IPv4 interfaces of this host. An enumeration failure yields an empty table.
pub fn local_interfaces() -> Vec<InterfaceAddr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Could not enumerate network interfaces: {}", e);
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(InterfaceAddr {
                name: iface.name,
                ip: v4.ip,
                netmask: v4.netmask,
            }),
            _ => None,
        })
        .collect()
}

pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    local_interfaces().into_iter().map(|iface| iface.ip).collect()
}

/// Picks the local address to advertise as a stream destination.
///
/// An explicit interface name wins, then the interface whose subnet contains
/// `peer`, then the first non-loopback interface with a conventional name.
pub fn resolve(peer: Option<Ipv4Addr>, interface: Option<&str>) -> Result<Ipv4Addr> {
    resolve_from(&local_interfaces(), peer, interface)
}

pub fn resolve_from(
    interfaces: &[InterfaceAddr],
    peer: Option<Ipv4Addr>,
    interface: Option<&str>,
) -> Result<Ipv4Addr> {
    let interface = interface.map(str::trim).filter(|name| !name.is_empty());

    let found = if let Some(name) = interface {
        interfaces.iter().find(|iface| iface.name == name)
    } else if let Some(peer) = peer {
        interfaces.iter().find(|iface| iface.contains(peer))
    } else {
        interfaces.iter().find(|iface| {
            !iface.ip.is_loopback()
                && INTERFACE_NAME_PREFIXES
                    .iter()
                    .any(|prefix| iface.name.starts_with(prefix))
        })
    };

    match found {
        Some(iface) => {
            debug!("Using {} ({}) as stream destination address", iface.ip, iface.name);
            Ok(iface.ip)
        }
        None => Err(DynamicsError::NoLocalAddress {
            interface: interface.unwrap_or_default().to_string(),
            peer: peer.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
        }),
    }
}
