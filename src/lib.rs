//! `sensor-node-listener` library.
//!
//! Decoders for the two ways a home sensor node publishes its readings: a
//! UDP broadcast packet carrying many named sensors ([`packet`]) and a BLE
//! advertisement carrying one labelled value ([`advertisement`],
//! [`manufacturer`]).
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The run loop lives in [`crate::app`] where it can be
//! tested with an injected listener and output streams.

pub mod advertisement;
pub mod app;
pub mod listener;
pub mod manufacturer;
pub mod measurement;
pub mod origin;
pub mod output;
pub mod packet;
pub mod reader;
pub mod record;
pub mod throttle;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::AdvertisementError;
pub use listener::{Backend, DecodeError, ListenConfig, ListenError, MeasurementResult};
pub use manufacturer::ManufacturerError;
pub use measurement::Measurement;
pub use origin::{MacAddress, Origin};
pub use output::OutputFormatter;
pub use packet::PacketError;
pub use record::{SensorReadings, SensorRecord, SensorValue};
pub use throttle::{Throttle, parse_duration};
