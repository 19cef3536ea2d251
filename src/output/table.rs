//! Plain-text sensor table.
//!
//! Records are sorted by name and split into two `Sensor | Value` column
//! pairs so a full packet fits on one screen.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use crate::record::{SensorRecord, SensorValue};

/// Sensors the node reports as counts or indexes; shown without a fraction.
const INTEGER_SENSORS: &[&str] = &[
    "iaq_accuracy",
    "iaq_averaged",
    "iaq_env",
    "iaq_pm",
    "iaq_pm_env",
    "pmc_0_3",
    "pmc_0_5",
    "pmc_1_0",
    "pmc_2_5",
    "pmc_5_0",
    "pmc_10_0",
    "uptime_sensor",
];

const HEADER: [&str; 5] = ["#", "Sensor", "Value", "Sensor", "Value"];

fn display_value(record: &SensorRecord) -> String {
    match (&record.value, record.precision) {
        (SensorValue::Number(v), None) if INTEGER_SENSORS.contains(&record.name.as_str()) => {
            format!("{}", v.trunc() as i64)
        }
        (SensorValue::Number(v), None) => format!("{v:.1}"),
        _ => record.formatted_value(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TableFormatter;

impl TableFormatter {
    pub fn new() -> Self {
        Self
    }

    fn rows(measurement: &Measurement) -> Vec<[String; 5]> {
        let mut records: Vec<&SensorRecord> = measurement.records.iter().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut cells: Vec<Option<&SensorRecord>> = records.into_iter().map(Some).collect();
        // Pad to an even count; the blank cell sorts first.
        if cells.len() % 2 != 0 {
            cells.insert(0, None);
        }

        let half = cells.len() / 2;
        let cell = |i: usize| {
            cells[i]
                .map(|r| (r.name.clone(), display_value(r)))
                .unwrap_or_default()
        };

        (0..half)
            .map(|i| {
                let (left_name, left_value) = cell(i);
                let (right_name, right_value) = cell(i + half);
                [
                    (i + 1).to_string(),
                    left_name,
                    left_value,
                    right_name,
                    right_value,
                ]
            })
            .collect()
    }
}

impl OutputFormatter for TableFormatter {
    fn format(&self, measurement: &Measurement) -> String {
        let rows = Self::rows(measurement);

        let mut widths = HEADER.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: [&str; 5]| {
            let [n, ln, lv, rn, rv] = cells;
            let [wn, wln, wlv, wrn, wrv] = widths;
            format!("{n:>wn$} | {ln:<wln$} | {lv:>wlv$} | {rn:<wrn$} | {rv:>wrv$}")
                .trim_end()
                .to_string()
        };

        let mut out = vec![format!("Sensor Data ({})", measurement.origin), line(HEADER)];
        out.push("-".repeat(widths.iter().sum::<usize>() + 3 * 4));
        out.extend(rows.iter().map(|row| line(row.each_ref().map(String::as_str))));
        out.join("\n")
    }
}
