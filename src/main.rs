use clap::Parser;
use sensor_node_listener::app::{Options, RealListener, run_with_io};
use std::panic::{self, PanicHookInfo};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Log to stderr so stdout stays clean for measurements.
///
/// `RUST_LOG` wins over the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Process managers (systemd, Telegraf execd) watch the exit status.
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {info}");
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_tracing(options.verbose);

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();

    match run_with_io(options, &RealListener, &mut out, &mut err).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            error!(error = %why, "listener stopped");
            std::process::exit(EXIT_ERROR);
        }
    }
}
