//! Where a measurement came from.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

/// The sender of a datagram or advertisement.
///
/// Used as the throttle key and as the `source` tag in output. A UDP sender
/// is identified by its IP alone; the source port changes between sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// UDP peer that broadcast the packet.
    Host(IpAddr),
    /// BLE device that advertised the reading.
    Device(MacAddress),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Host(ip) => write!(f, "{ip}"),
            Origin::Device(mac) => write!(f, "{mac}"),
        }
    }
}

impl From<IpAddr> for Origin {
    fn from(ip: IpAddr) -> Self {
        Origin::Host(ip)
    }
}

impl From<SocketAddr> for Origin {
    fn from(addr: SocketAddr) -> Self {
        Origin::Host(addr.ip())
    }
}

impl From<MacAddress> for Origin {
    fn from(mac: MacAddress) -> Self {
        Origin::Device(mac)
    }
}
