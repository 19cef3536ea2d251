//! Per-sender rate limiting of emitted measurements.
//!
//! BLE advertisements repeat every few tens of milliseconds and UDP nodes
//! broadcast on a fixed interval, so a throttle keeps output volume down
//! while data changes slowly.

use crate::origin::Origin;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Allows at most one event per `interval` for each [`Origin`].
///
/// The first event from an origin is always allowed.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_seen: HashMap<Origin, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_seen: HashMap::new(),
        }
    }

    /// Returns `true` and restarts the origin's timer if an event should be emitted.
    ///
    /// A suppressed event does not restart the timer.
    pub fn should_emit(&mut self, origin: Origin) -> bool {
        self.should_emit_at(origin, Instant::now())
    }

    fn should_emit_at(&mut self, origin: Origin, now: Instant) -> bool {
        match self.last_seen.get(&origin) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last_seen.insert(origin, now);
                true
            }
        }
    }
}

const UNITS: [(&str, u64); 4] = [("ms", 1), ("h", 3_600_000), ("m", 60_000), ("s", 1_000)];

/// Parse a duration such as `500ms`, `3s`, `1m` or `2h`.
///
/// A bare number is taken as seconds.
///
/// # Examples
/// ```
/// use sensor_node_listener::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|&(suffix, scale)| src.strip_suffix(suffix).map(|n| (n, scale)))
        .unwrap_or((src, 1_000));

    let count: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    count
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {src}"))
}
