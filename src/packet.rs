//! UDP sensor broadcast decoding.
//!
//! A packet is a small framing header followed by a sequence of keyed entries:
//!
//! ```text
//! magic: u16 LE (0x4553)
//! host_len: u8, host name field of round_up4(host_len + 1) bytes
//! 0x00 padding (any length)
//! security key: u8 (0x01 data, or 0x04 rolling code + 8 opaque bytes)
//! entries until end of buffer:
//!   0x00                                  zero fill
//!   0x01 value:u8 name_len:u8 name        binary sensor
//!   0x02 bits:u32 LE name_len:u8 name     sensor (bits are an IEEE-754 f32)
//! ```
//!
//! Decoding is a pure function of the input buffer plus the capture time.

use crate::reader::{BufferTooShort, Reader};
use crate::record::{SensorReadings, TIMESTAMP_KEY};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;

pub const MAGIC_NUMBER: u16 = 0x4553;

/// Largest datagram the sender emits.
pub const MAX_PACKET_SIZE: usize = 508;

/// Port the sensor node broadcasts on.
pub const DEFAULT_PORT: u16 = 18511;

/// Packets shorter than this are rejected before the magic is read.
pub const MIN_PACKET_LEN: usize = 8;

/// Bytes that must remain after the header for the packet to be complete.
pub const MIN_BODY_LEN: usize = 200;

pub const ROLLING_CODE_LEN: usize = 8;

pub const ZERO_FILL_KEY: u8 = 0x00;
pub const DATA_KEY: u8 = 0x01;
pub const BINARY_SENSOR_KEY: u8 = 0x01;
pub const SENSOR_KEY: u8 = 0x02;
pub const PING_KEY: u8 = 0x03;
pub const ROLLING_CODE_KEY: u8 = 0x04;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Security key found after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityKey {
    /// Plain data packet.
    Data,
    /// Rolling-code packet. The code is skipped, not verified.
    RollingCode,
}

/// Outcome of header validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header<'a> {
    /// Header accepted; `body` holds the entries.
    Ready {
        security: SecurityKey,
        body: &'a [u8],
    },
    /// Fewer than [`MIN_BODY_LEN`] bytes after the header.
    Incomplete { remaining: usize },
}

/// Failure decoding a single entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntryError {
    #[error(transparent)]
    BufferTooShort(#[from] BufferTooShort),
    #[error("binary sensor entry truncated: {remaining} bytes left, need at least 3")]
    IncompleteData { remaining: usize },
    #[error("unexpected entry key 0x{0:02X}")]
    UnexpectedKey(u8),
    #[error("sensor name is not valid UTF-8")]
    InvalidName,
}

/// Failure decoding a UDP packet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PacketError {
    #[error("bad length: {len} bytes")]
    TooShort { len: usize },
    #[error("bad magic 0x{0:04X}")]
    BadMagic(u16),
    #[error("incomplete packet: {remaining} bytes after header")]
    Incomplete { remaining: usize },
    #[error("expected rolling code or data key, got 0x{0:02X}")]
    UnexpectedSecurityKey(u8),
    /// An entry failed; `readings` holds everything decoded before it.
    #[error("entry decode failed after {} readings: {source}", readings.len())]
    Entry {
        readings: SensorReadings,
        #[source]
        source: EntryError,
    },
}

impl PacketError {
    /// True for the framing failures: short buffer or wrong magic.
    pub fn is_framing(&self) -> bool {
        matches!(self, PacketError::TooShort { .. } | PacketError::BadMagic(_))
    }

    /// The readings a listener should still forward for this failure.
    ///
    /// Empty unless framing succeeded and an entry failed part way through.
    pub fn into_readings(self) -> SensorReadings {
        match self {
            PacketError::Entry { readings, .. } => readings,
            _ => SensorReadings::new(),
        }
    }
}

fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

/// Validate the framing header and locate the entry body.
pub fn parse_header(buf: &[u8]) -> Result<Header<'_>, PacketError> {
    if buf.len() < MIN_PACKET_LEN {
        return Err(PacketError::TooShort { len: buf.len() });
    }

    let mut reader = Reader::new(buf);
    let magic = reader
        .read_u16_le()
        .map_err(|_| PacketError::TooShort { len: buf.len() })?;
    if magic != MAGIC_NUMBER {
        return Err(PacketError::BadMagic(magic));
    }

    let host_len = reader
        .read_u8()
        .map_err(|_| PacketError::TooShort { len: buf.len() })?;
    reader.skip_clamped(round_up4(usize::from(host_len) + 1));
    reader.skip_while(|b| b == 0x00);

    if reader.remaining() < MIN_BODY_LEN {
        return Ok(Header::Incomplete {
            remaining: reader.remaining(),
        });
    }

    let remaining = reader.remaining();
    let key = reader
        .read_u8()
        .map_err(|_| PacketError::Incomplete { remaining })?;
    let security = match key {
        ROLLING_CODE_KEY => {
            reader
                .skip(ROLLING_CODE_LEN)
                .map_err(|_| PacketError::Incomplete { remaining })?;
            SecurityKey::RollingCode
        }
        DATA_KEY => SecurityKey::Data,
        other => return Err(PacketError::UnexpectedSecurityKey(other)),
    };

    Ok(Header::Ready {
        security,
        body: reader.as_slice(),
    })
}

fn read_name(reader: &mut Reader<'_>) -> Result<String, EntryError> {
    let bytes = reader.read_length_prefixed()?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| EntryError::InvalidName)
}

/// Round to one decimal place, the resolution the sender guarantees.
fn round_tenths(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

fn decode_entries(body: &[u8], readings: &mut SensorReadings) -> Result<(), EntryError> {
    let mut reader = Reader::new(body);

    while let Ok(key) = reader.read_u8() {
        match key {
            ZERO_FILL_KEY => continue,
            BINARY_SENSOR_KEY => {
                if reader.remaining() < 3 {
                    return Err(EntryError::IncompleteData {
                        remaining: reader.remaining(),
                    });
                }
                let value = reader.read_u8()?;
                let name = read_name(&mut reader)?;
                trace!(%name, value, "binary sensor");
                readings.insert(name, value != 0);
            }
            SENSOR_KEY => {
                let value = reader.read_f32_bits_le()?;
                let name = read_name(&mut reader)?;
                trace!(%name, value, "sensor");
                readings.insert(name, round_tenths(value));
            }
            other => return Err(EntryError::UnexpectedKey(other)),
        }
    }

    Ok(())
}

/// Decode a packet, stamping it with `now`.
pub fn decode_at(buf: &[u8], now: DateTime<Utc>) -> Result<SensorReadings, PacketError> {
    let body = match parse_header(buf)? {
        Header::Ready { body, .. } => body,
        Header::Incomplete { remaining } => return Err(PacketError::Incomplete { remaining }),
    };

    let mut readings = SensorReadings::new();
    readings.insert(TIMESTAMP_KEY, now.format(TIMESTAMP_FORMAT).to_string());

    match decode_entries(body, &mut readings) {
        Ok(()) => Ok(readings),
        Err(source) => Err(PacketError::Entry { readings, source }),
    }
}

/// Decode a packet, stamping it with the current UTC time.
pub fn decode(buf: &[u8]) -> Result<SensorReadings, PacketError> {
    decode_at(buf, Utc::now())
}

/// Decode a packet, degrading every failure to the readings still usable.
///
/// Framing, incomplete and security-key failures give an empty mapping.
pub fn decode_lenient(buf: &[u8]) -> SensorReadings {
    decode(buf).unwrap_or_else(PacketError::into_readings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SensorValue;
    use crate::test_utils::{PacketBuilder, fixed_time};

    #[test]
    fn test_round_up4() {
        assert_eq!(round_up4(1), 4);
        assert_eq!(round_up4(4), 4);
        assert_eq!(round_up4(5), 8);
        assert_eq!(round_up4(9), 12);
    }

    #[test]
    fn test_decode_sensor_and_binary_sensor() {
        let packet = PacketBuilder::new("livingroom")
            .sensor("temperature", 21.37)
            .binary_sensor("window", 1)
            .binary_sensor("door", 0)
            .build();

        let readings = decode_at(&packet, fixed_time()).unwrap();
        assert_eq!(readings.len(), 4);
        assert_eq!(readings.get("temperature"), Some(&SensorValue::Number(21.4)));
        assert_eq!(readings.get("window"), Some(&SensorValue::Bool(true)));
        assert_eq!(readings.get("door"), Some(&SensorValue::Bool(false)));
        assert_eq!(readings.timestamp(), Some("2024-05-06 07:08:09"));
    }

    #[test]
    fn test_entry_count_plus_timestamp() {
        for n in 0..6 {
            let mut builder = PacketBuilder::new("node");
            for i in 0..n {
                builder = if i % 2 == 0 {
                    builder.sensor(&format!("s{i}"), i as f32)
                } else {
                    builder.binary_sensor(&format!("b{i}"), i as u8)
                };
            }
            let readings = decode_at(&builder.build(), fixed_time()).unwrap();
            assert_eq!(readings.len(), n + 1, "{n} entries");
        }
    }

    #[test]
    fn test_nonzero_binary_value_is_true() {
        for value in [1u8, 2, 0x7F, 0xFF] {
            let packet = PacketBuilder::new("node")
                .binary_sensor("motion", value)
                .build();
            let readings = decode_at(&packet, fixed_time()).unwrap();
            assert_eq!(readings.get("motion"), Some(&SensorValue::Bool(true)));
        }
    }

    #[test]
    fn test_float_bit_pattern() {
        let packet = PacketBuilder::new("node")
            .raw_sensor("answer", 0x4228_0000)
            .build();
        let readings = decode_at(&packet, fixed_time()).unwrap();
        assert_eq!(readings.get("answer"), Some(&SensorValue::Number(42.0)));
    }

    #[test]
    fn test_rounding_stays_within_half_tenth() {
        for value in [-12.34f32, 0.04, 0.06, 19.99, 1013.25, 55.55] {
            let packet = PacketBuilder::new("node").sensor("v", value).build();
            let readings = decode_at(&packet, fixed_time()).unwrap();
            let decoded = readings.get("v").and_then(SensorValue::as_f64).unwrap();
            assert!(
                (decoded - f64::from(value)).abs() <= 0.05 + 1e-6,
                "{value} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn test_rolling_code_is_skipped() {
        let packet = PacketBuilder::new("node")
            .rolling_code([0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04])
            .sensor("humidity", 40.0)
            .build();

        match parse_header(&packet).unwrap() {
            Header::Ready { security, .. } => assert_eq!(security, SecurityKey::RollingCode),
            other => panic!("unexpected header {other:?}"),
        }
        let readings = decode_at(&packet, fixed_time()).unwrap();
        assert_eq!(readings.get("humidity"), Some(&SensorValue::Number(40.0)));
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn test_padding_before_security_key() {
        let packet = PacketBuilder::new("node")
            .padding(5)
            .sensor("co2", 612.0)
            .build();
        let readings = decode_at(&packet, fixed_time()).unwrap();
        assert_eq!(readings.get("co2"), Some(&SensorValue::Number(612.0)));
    }

    #[test]
    fn test_short_packet() {
        for len in 0..MIN_PACKET_LEN {
            let packet = vec![0x53; len];
            assert_eq!(decode(&packet), Err(PacketError::TooShort { len }));
            assert!(decode_lenient(&packet).is_empty());
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut packet = PacketBuilder::new("node").sensor("t", 1.0).build();
        packet[0] = 0x45;
        packet[1] = 0x53;
        let err = decode(&packet).unwrap_err();
        assert_eq!(err, PacketError::BadMagic(0x5345));
        assert!(err.is_framing());
        assert!(decode_lenient(&packet).is_empty());
    }

    #[test]
    fn test_incomplete_packet_is_soft() {
        // Valid header but only a handful of bytes after it.
        let packet = [0x53, 0x45, 0x03, b'a', b'b', b'c', 0x00, 0x01, 0x02, 0x00];
        assert_eq!(
            parse_header(&packet).unwrap(),
            Header::Incomplete { remaining: 3 }
        );
        assert_eq!(
            decode(&packet),
            Err(PacketError::Incomplete { remaining: 3 })
        );
        assert!(decode_lenient(&packet).is_empty());
    }

    /// Header with an empty host name followed by a data key and `body_len - 1` zero bytes.
    fn packet_with_body(body_len: usize) -> Vec<u8> {
        let mut packet = vec![0x53, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, DATA_KEY];
        packet.resize(packet.len() + body_len - 1, ZERO_FILL_KEY);
        packet
    }

    #[test]
    fn test_body_one_byte_short_is_incomplete() {
        let packet = packet_with_body(MIN_BODY_LEN - 1);
        assert_eq!(
            parse_header(&packet).unwrap(),
            Header::Incomplete { remaining: 199 }
        );
        assert_eq!(
            decode(&packet),
            Err(PacketError::Incomplete { remaining: 199 })
        );
    }

    #[test]
    fn test_body_of_exactly_min_len_is_ready() {
        let packet = packet_with_body(MIN_BODY_LEN);
        match parse_header(&packet).unwrap() {
            Header::Ready { security, body } => {
                assert_eq!(security, SecurityKey::Data);
                assert_eq!(body.len(), MIN_BODY_LEN - 1);
            }
            other => panic!("unexpected header {other:?}"),
        }
        let readings = decode_at(&packet, fixed_time()).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings.timestamp(), Some("2024-05-06 07:08:09"));
    }

    #[test]
    fn test_host_field_longer_than_packet() {
        let packet = [0x53, 0x45, 0xFF, 0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(
            decode(&packet),
            Err(PacketError::Incomplete { remaining: 0 })
        );
    }

    #[test]
    fn test_unexpected_security_key() {
        let packet = PacketBuilder::new("node").security_key(0x07).build();
        assert_eq!(decode(&packet), Err(PacketError::UnexpectedSecurityKey(0x07)));
        assert!(decode_lenient(&packet).is_empty());
    }

    #[test]
    fn test_unknown_entry_key_keeps_earlier_readings() {
        let packet = PacketBuilder::new("node")
            .sensor("pressure", 1013.2)
            .raw(&[0x09, 0x01, 0x02])
            .sensor("never", 1.0)
            .build();

        let err = decode_at(&packet, fixed_time()).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Entry {
                source: EntryError::UnexpectedKey(0x09),
                ..
            }
        ));
        let readings = err.into_readings();
        assert_eq!(readings.len(), 2);
        assert!(readings.contains("pressure"));
        assert!(!readings.contains("never"));
    }

    #[test]
    fn test_reserved_keys_are_not_entries() {
        for key in [PING_KEY, ROLLING_CODE_KEY] {
            let packet = PacketBuilder::new("node").raw(&[key]).build();
            let err = decode_at(&packet, fixed_time()).unwrap_err();
            assert!(matches!(
                err,
                PacketError::Entry { source: EntryError::UnexpectedKey(k), .. } if k == key
            ));
        }
    }

    #[test]
    fn test_truncated_binary_sensor() {
        let packet = PacketBuilder::new("node")
            .sensor("t", 20.0)
            .raw(&[BINARY_SENSOR_KEY, 0x01])
            .build();

        let readings = decode_lenient(&packet);
        let err = decode_at(&packet, fixed_time()).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Entry {
                source: EntryError::IncompleteData { remaining: 1 },
                ..
            }
        ));
        assert_eq!(readings.len(), 2);
        assert!(readings.contains("t"));
    }

    #[test]
    fn test_name_past_end_of_buffer() {
        let packet = PacketBuilder::new("node")
            .raw(&[SENSOR_KEY, 0, 0, 0x28, 0x42, 50, b'x'])
            .build();
        let err = decode_at(&packet, fixed_time()).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Entry {
                source: EntryError::BufferTooShort(BufferTooShort { needed: 50, .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let packet = PacketBuilder::new("node")
            .raw(&[BINARY_SENSOR_KEY, 1, 2, 0xC3, 0x28])
            .build();
        let err = decode_at(&packet, fixed_time()).unwrap_err();
        assert!(matches!(
            err,
            PacketError::Entry {
                source: EntryError::InvalidName,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_is_repeatable() {
        let packet = PacketBuilder::new("node")
            .sensor("temperature", 22.5)
            .binary_sensor("leak", 0)
            .build();

        let mut first = decode(&packet).unwrap();
        let mut second = decode(&packet).unwrap();
        assert!(first.timestamp().is_some());
        first.insert(TIMESTAMP_KEY, String::new());
        second.insert(TIMESTAMP_KEY, String::new());
        assert_eq!(first, second);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(PacketError::BadMagic(0x1234).to_string(), "bad magic 0x1234");
        assert_eq!(
            PacketError::UnexpectedSecurityKey(0x09).to_string(),
            "expected rolling code or data key, got 0x09"
        );
        let err = PacketError::Entry {
            readings: SensorReadings::new(),
            source: EntryError::UnexpectedKey(0x03),
        };
        assert_eq!(
            err.to_string(),
            "entry decode failed after 0 readings: unexpected entry key 0x03"
        );
    }
}
