//! Input backends that feed raw sensor data through the decoders.
//!
//! A backend owns nothing but a receive loop: take bytes from the network or
//! the Bluetooth stack, decode them, and forward the result over a channel.
//! Malformed input becomes a [`DecodeError`] and never stops the loop.

#[cfg(feature = "bluer")]
pub mod bluer;
#[cfg(feature = "hci")]
pub mod hci;

pub mod udp;

use crate::advertisement::{self, AdvertisementError};
use crate::manufacturer::{self, ManufacturerError};
use crate::measurement::Measurement;
use crate::origin::{MacAddress, Origin};
use crate::packet::{self, PacketError};
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Error types for decoding received data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Packet from {origin}: {source}")]
    Packet {
        origin: Origin,
        #[source]
        source: PacketError,
    },
    #[error("Advertisement from {origin}: {source}")]
    Advertisement {
        origin: Origin,
        #[source]
        source: AdvertisementError,
    },
    #[error("Manufacturer data from {origin}: {source}")]
    Manufacturer {
        origin: Origin,
        #[source]
        source: ManufacturerError,
    },
}

/// Convenience alias for decoded measurements or decode errors.
pub type MeasurementResult = Result<Measurement, DecodeError>;

/// Error type for listener operations.
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Channel buffer size for measurement results.
pub const MEASUREMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available input backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// UDP broadcasts from the sensor node
    #[default]
    Udp,
    /// BLE advertisements via the BlueZ D-Bus daemon
    #[cfg(feature = "bluer")]
    Bluer,
    /// BLE advertisements read from a raw HCI socket
    #[cfg(feature = "hci")]
    Hci,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Udp => write!(f, "udp"),
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "udp" => Ok(Backend::Udp),
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" | "ble" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {s}")),
        }
    }
}

/// Settings a backend needs to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenConfig {
    pub backend: Backend,
    /// Local address for the UDP backend.
    pub bind: SocketAddr,
    /// Forward decode errors instead of dropping them.
    pub verbose: bool,
}

/// Decode one UDP datagram.
///
/// A packet that fails part way through its entries still yields a
/// measurement with the readings decoded before the failure.
pub fn decode_datagram(peer: SocketAddr, data: &[u8]) -> MeasurementResult {
    match packet::decode(data) {
        Ok(readings) => Ok(Measurement::from_readings(peer, readings)),
        Err(source @ PacketError::Entry { .. }) => {
            warn!(%peer, error = %source, "partially decoded packet");
            Ok(Measurement::from_readings(peer, source.into_readings()))
        }
        Err(source) => {
            debug!(%peer, error = %source, len = data.len(), "rejected datagram");
            Err(DecodeError::Packet {
                origin: peer.into(),
                source,
            })
        }
    }
}

/// Decode a full BLE advertising payload (all AD structures).
pub fn decode_advertisement(mac: MacAddress, payload: &[u8]) -> MeasurementResult {
    advertisement::decode(payload)
        .map(|record| Measurement::from_record(mac, record))
        .map_err(|source| {
            debug!(%mac, error = %source, "rejected advertisement");
            DecodeError::Advertisement {
                origin: mac.into(),
                source,
            }
        })
}

/// Decode manufacturer data that still carries its company-id bytes.
pub fn decode_manufacturer_data(mac: MacAddress, data: &[u8]) -> MeasurementResult {
    manufacturer::decode(data)
        .map(|record| Measurement::from_record(mac, record))
        .map_err(|source| {
            debug!(%mac, error = %source, "rejected manufacturer data");
            DecodeError::Manufacturer {
                origin: mac.into(),
                source,
            }
        })
}

/// Start the backend selected in `config`.
///
/// # Returns
/// A receiver for measurements (or decode errors if verbose).
pub async fn start(config: ListenConfig) -> Result<mpsc::Receiver<MeasurementResult>, ListenError> {
    match config.backend {
        Backend::Udp => udp::start(config.bind, config.verbose).await,
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start(config.verbose).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start(config.verbose).await,
    }
}
