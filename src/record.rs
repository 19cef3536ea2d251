//! Decoded sensor values and records.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Key under which a UDP decode stores its capture time.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// A single decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Number(f64),
    Bool(bool),
    /// Only produced for the synthetic `timestamp` entry.
    Text(String),
}

impl SensorValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SensorValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SensorValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(v) => write!(f, "{v}"),
            SensorValue::Bool(b) => write!(f, "{b}"),
            SensorValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for SensorValue {
    fn from(v: f64) -> Self {
        SensorValue::Number(v)
    }
}

impl From<bool> for SensorValue {
    fn from(b: bool) -> Self {
        SensorValue::Bool(b)
    }
}

impl From<String> for SensorValue {
    fn from(s: String) -> Self {
        SensorValue::Text(s)
    }
}

/// One named reading, optionally carrying its unit and display precision.
///
/// Advertisements produce exactly one record with both set. Records built
/// from a UDP packet carry only a name and a value.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub name: String,
    pub value: SensorValue,
    pub unit: Option<String>,
    /// Number of fraction digits the sender encoded the value with.
    pub precision: Option<u8>,
}

impl SensorRecord {
    pub fn new(name: impl Into<String>, value: impl Into<SensorValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: None,
            precision: None,
        }
    }

    /// The value alone, rendered with the record's precision and unit.
    ///
    /// A unit of `s` is shown as an uptime such as `1d 2h 3m 4s`.
    pub fn formatted_value(&self) -> String {
        let unit = self.unit.as_deref().unwrap_or("");
        match (&self.value, self.precision) {
            (SensorValue::Number(v), _) if unit == "s" => format_uptime(*v),
            (SensorValue::Number(v), Some(precision)) => {
                format!("{v:.prec$}{unit}", prec = usize::from(precision))
            }
            (value, _) => format!("{value}{unit}"),
        }
    }
}

impl fmt::Display for SensorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.formatted_value())
    }
}

fn format_uptime(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.0}s");
    }

    let total = seconds as u64;
    let days = total / 86_400;
    let hours = total / 3_600 % 24;
    let minutes = total / 60 % 60;
    let secs = total % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 || days > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || hours > 0 || days > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

/// Name → value mapping decoded from one UDP packet, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorReadings(BTreeMap<String, SensorValue>);

impl SensorReadings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SensorValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SensorValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The capture time added by a successful decode, if present.
    pub fn timestamp(&self) -> Option<&str> {
        self.get(TIMESTAMP_KEY).and_then(SensorValue::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, SensorValue> {
        self.0.iter()
    }

    /// Convert into records without unit or precision.
    pub fn into_records(self) -> Vec<SensorRecord> {
        self.0
            .into_iter()
            .map(|(name, value)| SensorRecord::new(name, value))
            .collect()
    }
}

impl<'a> IntoIterator for &'a SensorReadings {
    type Item = (&'a String, &'a SensorValue);
    type IntoIter = btree_map::Iter<'a, String, SensorValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
