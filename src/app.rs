//! Core application runner for `sensor-node-listener`.
//!
//! Kept apart from CLI parsing and process exit codes so it can be driven by a
//! fake listener and in-memory output streams.

use crate::listener::{Backend, ListenConfig, ListenError, MeasurementResult};
use crate::measurement::Measurement;
use crate::output::influxdb::InfluxDbFormatter;
use crate::output::table::TableFormatter;
use crate::output::{Format, OutputFormatter};
use crate::packet::DEFAULT_PORT;
use crate::throttle::Throttle;
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Input backend to listen on
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Local address for the UDP backend
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// UDP port the sensor node broadcasts to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Output format
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "sensor_node")]
    pub influxdb_measurement: String,

    /// Verbose output, print decode errors for unrecognized data
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Throttle events per sender to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::throttle::parse_duration)]
    pub throttle: Option<Duration>,
}

impl Options {
    pub fn listen_config(&self) -> ListenConfig {
        ListenConfig {
            backend: self.backend,
            bind: SocketAddr::new(self.bind, self.port),
            verbose: self.verbose,
        }
    }

    fn formatter(&self) -> Box<dyn OutputFormatter> {
        match self.format {
            Format::Table => Box::new(TableFormatter::new()),
            Format::Influxdb => Box::new(InfluxDbFormatter::new(self.influxdb_measurement.clone())),
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Listen(#[from] ListenError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Input source abstraction so the run loop can be tested without sockets or Bluetooth.
pub trait Listener: Send + Sync {
    fn start(
        &self,
        config: ListenConfig,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<MeasurementResult>, ListenError>> + Send + '_>,
    >;
}

/// Listener that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealListener;

impl Listener for RealListener {
    fn start(
        &self,
        config: ListenConfig,
    ) -> Pin<
        Box<dyn Future<Output = Result<mpsc::Receiver<MeasurementResult>, ListenError>> + Send + '_>,
    > {
        Box::pin(crate::listener::start(config))
    }
}

fn write_measurement(
    formatter: &dyn OutputFormatter,
    measurement: &Measurement,
    out: &mut dyn Write,
) -> io::Result<()> {
    let text = formatter.format(measurement);
    writeln!(out, "{text}")
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - Measurements pass through the optional throttle, keyed by sender, and are written to `out`.
/// - Decode errors are written to `err` only when `options.verbose` is true.
///
/// Returns once the listener closes its channel.
pub async fn run_with_io(
    options: Options,
    listener: &dyn Listener,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let formatter = options.formatter();
    let mut throttle = options.throttle.map(Throttle::new);

    let mut measurements = listener.start(options.listen_config()).await?;

    while let Some(result) = measurements.recv().await {
        match result {
            Ok(measurement) => {
                let should_emit = throttle
                    .as_mut()
                    .is_none_or(|t: &mut Throttle| t.should_emit(measurement.origin));

                if should_emit {
                    write_measurement(formatter.as_ref(), &measurement, out)?;
                } else {
                    debug!(origin = %measurement.origin, "throttled");
                }
            }
            Err(decode_err) => {
                if options.verbose {
                    writeln!(err, "{decode_err}")?;
                }
            }
        }
    }

    Ok(())
}
