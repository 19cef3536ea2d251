//! BLE advertisement decoding.
//!
//! An advertising payload is a run of AD structures, each
//! `length: u8, type: u8, data: length - 1 bytes`, ended by a zero length
//! or the end of the buffer. The reading travels in the manufacturer-specific
//! structure (type `0xFF`), decoded by [`crate::manufacturer`].

use crate::manufacturer::{self, ManufacturerError};
use crate::record::SensorRecord;
use thiserror::Error;

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
pub const MANUFACTURER_DATA_TYPE: u8 = 0xFF;

/// Shortest payload worth scanning.
pub const MIN_ADVERTISEMENT_LEN: usize = 4;

/// Errors decoding an advertising payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvertisementError {
    #[error("invalid advertisement data: {0} bytes")]
    TooShort(usize),
    #[error("no manufacturer data found in advertisement")]
    NotFound,
    #[error(transparent)]
    Manufacturer(#[from] ManufacturerError),
}

/// Locate the manufacturer-specific data in an advertising payload.
///
/// A structure whose declared length runs past the buffer is cut at the
/// buffer end; the manufacturer decoder then reports what is missing.
pub fn find_manufacturer_data(payload: &[u8]) -> Option<&[u8]> {
    let mut index = 0;
    while index < payload.len() {
        let length = usize::from(payload[index]);
        if length == 0 {
            return None;
        }

        let ad_type = *payload.get(index + 1)?;
        if ad_type == MANUFACTURER_DATA_TYPE {
            let start = index + 2;
            let end = (start + length - 1).min(payload.len());
            return Some(&payload[start..end]);
        }

        index += length + 1;
    }
    None
}

/// Decode the single reading carried by an advertising payload.
pub fn decode(payload: &[u8]) -> Result<SensorRecord, AdvertisementError> {
    if payload.len() < MIN_ADVERTISEMENT_LEN {
        return Err(AdvertisementError::TooShort(payload.len()));
    }

    let data = find_manufacturer_data(payload).ok_or(AdvertisementError::NotFound)?;
    Ok(manufacturer::decode(data)?)
}
