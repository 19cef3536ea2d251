//! Output formatters for decoded measurements.
//!
//! [`OutputFormatter`] turns a [`Measurement`] into text for stdout. The
//! `table` formatter mirrors the interactive sensor table; `influxdb` emits
//! line protocol for Telegraf-style collectors.

pub mod influxdb;
pub mod table;

use crate::measurement::Measurement;

/// Trait for formatting measurements into output strings.
pub trait OutputFormatter: Send + Sync {
    /// Format one measurement. The result carries no trailing newline.
    fn format(&self, measurement: &Measurement) -> String;
}

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Two-column sensor table
    #[default]
    Table,
    /// InfluxDB line protocol
    Influxdb,
}
