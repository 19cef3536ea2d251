//! InfluxDB line protocol output formatter.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use crate::record::SensorValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::String(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

impl From<&SensorValue> for FieldValue {
    fn from(value: &SensorValue) -> Self {
        match value {
            SensorValue::Number(v) => FieldValue::Float(*v),
            SensorValue::Bool(b) => FieldValue::Boolean(*b),
            SensorValue::Text(s) => FieldValue::String(s.clone()),
        }
    }
}

/// Escape commas, equals signs and spaces in tag keys, tag values and field keys.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement.replace([',', ' '], "_"))?;
        for (key, value) in &self.tag_set {
            write!(fmt, ",{}={}", escape_key(key), escape_key(value))?;
        }

        let mut separator = " ";
        for (key, value) in &self.field_set {
            write!(fmt, "{separator}{}={value}", escape_key(key))?;
            separator = ",";
        }

        if let Some(nanos) = self
            .timestamp
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        {
            write!(fmt, " {}", nanos.as_nanos())?;
        }
        Ok(())
    }
}

/// InfluxDB line protocol formatter.
///
/// Each record becomes one field; the sender is the `source` tag.
pub struct InfluxDbFormatter {
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn to_data_point(&self, measurement: &Measurement) -> DataPoint {
        let mut tag_set = BTreeMap::new();
        tag_set.insert("source".to_string(), measurement.origin.to_string());

        // Line protocol has no NaN or infinity; a sensor without state is left out.
        let field_set = measurement
            .records
            .iter()
            .filter(|r| r.value.as_f64().is_none_or(f64::is_finite))
            .map(|r| (r.name.clone(), FieldValue::from(&r.value)))
            .collect();

        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set,
            field_set,
            timestamp: Some(measurement.received_at),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, measurement: &Measurement) -> String {
        self.to_data_point(measurement).to_string()
    }
}
