//! Manufacturer-specific data decoding.
//!
//! The payload carries exactly one reading:
//!
//! ```text
//! company id: 2 bytes, FF FF
//! label_len: u8, label: UTF-8
//! unit_len: u8, unit: UTF-8
//! precision: u8
//! raw value: i32 big-endian, value = raw / 10^precision
//! ```

use crate::reader::Reader;
use crate::record::{SensorRecord, SensorValue};
use thiserror::Error;

/// Company identifier the sensor node advertises with.
pub const COMPANY_ID: u16 = 0xFFFF;

/// Errors decoding a manufacturer payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManufacturerError {
    #[error("invalid company ID 0x{0:04X}")]
    InvalidCompanyId(u16),
    #[error("incomplete manufacturer data: missing {field}")]
    IncompleteData { field: &'static str },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

fn read_text(reader: &mut Reader<'_>, field: &'static str) -> Result<String, ManufacturerError> {
    let bytes = reader
        .read_length_prefixed()
        .map_err(|_| ManufacturerError::IncompleteData { field })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ManufacturerError::InvalidUtf8 { field })
}

/// Decode a manufacturer payload, including its two company-id bytes.
pub fn decode(data: &[u8]) -> Result<SensorRecord, ManufacturerError> {
    let mut reader = Reader::new(data);

    let company = reader
        .take(2)
        .map_err(|_| ManufacturerError::IncompleteData {
            field: "company ID",
        })?;
    if company != COMPANY_ID.to_le_bytes() {
        return Err(ManufacturerError::InvalidCompanyId(u16::from_le_bytes([
            company[0], company[1],
        ])));
    }

    let label = read_text(&mut reader, "label")?;
    let unit = read_text(&mut reader, "unit")?;
    let precision = reader
        .read_u8()
        .map_err(|_| ManufacturerError::IncompleteData { field: "precision" })?;
    let raw = reader
        .read_i32_be()
        .map_err(|_| ManufacturerError::IncompleteData { field: "value" })?;

    Ok(SensorRecord {
        name: label,
        value: SensorValue::Number(scale(raw, precision)),
        unit: Some(unit),
        precision: Some(precision),
    })
}

/// `raw × 10^-precision`, computed as a single division so exact decimals stay exact.
fn scale(raw: i32, precision: u8) -> f64 {
    f64::from(raw) / 10f64.powi(i32::from(precision))
}
