//! A decoded batch of sensor records from one sender.

use crate::origin::Origin;
use crate::record::{SensorReadings, SensorRecord};
use std::time::SystemTime;

/// Everything decoded from one datagram or advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Sender of the data
    pub origin: Origin,
    /// When the listener received the data
    pub received_at: SystemTime,
    /// Decoded records, sorted by name for UDP packets
    pub records: Vec<SensorRecord>,
}

impl Measurement {
    /// Measurement from a decoded UDP packet.
    pub fn from_readings(origin: impl Into<Origin>, readings: SensorReadings) -> Self {
        Self {
            origin: origin.into(),
            received_at: SystemTime::now(),
            records: readings.into_records(),
        }
    }

    /// Measurement from a single advertised record.
    pub fn from_record(origin: impl Into<Origin>, record: SensorRecord) -> Self {
        Self {
            origin: origin.into(),
            received_at: SystemTime::now(),
            records: vec![record],
        }
    }

    pub fn record(&self, name: &str) -> Option<&SensorRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}
