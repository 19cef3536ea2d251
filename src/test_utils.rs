use crate::origin::{MacAddress, Origin};
use crate::packet::{
    BINARY_SENSOR_KEY, DATA_KEY, MAGIC_NUMBER, MIN_BODY_LEN, ROLLING_CODE_KEY, SENSOR_KEY,
};
use chrono::{DateTime, TimeZone, Utc};
use std::net::{Ipv4Addr, SocketAddr};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

pub fn test_peer() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(192, 168, 1, 50), 18511))
}

pub fn test_origin() -> Origin {
    Origin::from(test_peer())
}

/// 2024-05-06 07:08:09 UTC.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
}

/// Builds UDP sensor packets the way the sensor node lays them out.
///
/// Zero-fill entries are placed right after the security key so the body
/// always reaches [`MIN_BODY_LEN`] while the last entry still ends the buffer.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    host: Vec<u8>,
    padding: usize,
    security: Vec<u8>,
    entries: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.as_bytes().to_vec(),
            padding: 0,
            security: vec![DATA_KEY],
            entries: Vec::new(),
        }
    }

    /// Zero bytes between the host name field and the security key.
    pub fn padding(mut self, n: usize) -> Self {
        self.padding = n;
        self
    }

    pub fn security_key(mut self, key: u8) -> Self {
        self.security = vec![key];
        self
    }

    pub fn rolling_code(mut self, code: [u8; 8]) -> Self {
        self.security = vec![ROLLING_CODE_KEY];
        self.security.extend_from_slice(&code);
        self
    }

    pub fn sensor(self, name: &str, value: f32) -> Self {
        self.raw_sensor(name, value.to_bits())
    }

    pub fn raw_sensor(mut self, name: &str, bits: u32) -> Self {
        self.entries.push(SENSOR_KEY);
        self.entries.extend_from_slice(&bits.to_le_bytes());
        self.push_name(name);
        self
    }

    pub fn binary_sensor(mut self, name: &str, value: u8) -> Self {
        self.entries.push(BINARY_SENSOR_KEY);
        self.entries.push(value);
        self.push_name(name);
        self
    }

    /// Append bytes to the entry section verbatim.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.entries.extend_from_slice(bytes);
        self
    }

    fn push_name(&mut self, name: &str) {
        self.entries.push(name.len() as u8);
        self.entries.extend_from_slice(name.as_bytes());
    }

    pub fn build(&self) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&MAGIC_NUMBER.to_le_bytes());
        packet.push(self.host.len() as u8);

        let host_field = (self.host.len() + 1 + 3) & !3;
        let mut host = self.host.clone();
        host.resize(host_field, 0);
        packet.extend_from_slice(&host);

        packet.resize(packet.len() + self.padding, 0);

        let body_len = self.security.len() + self.entries.len();
        packet.extend_from_slice(&self.security);
        packet.resize(packet.len() + MIN_BODY_LEN.saturating_sub(body_len), 0);
        packet.extend_from_slice(&self.entries);
        packet
    }
}
