use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use overwitch::device::DEVICE;
use overwitch::transport::{SyntheticTransport, Transport};
use overwitch::{jack_io, signals, BridgeError};

fn help(exec_name: &str) {
    eprintln!("overwitch {}", env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exec_name} [-v] [-h]");
}

/// Hand-rolled argument scan, matching the command-line surface of
/// spec.md §6: `-h` (help, exit 0), repeatable `-v` (verbosity), any
/// other flag is an error.
struct Args {
    verbosity: u8,
}

fn parse_args() -> Result<Args, ()> {
    let mut verbosity = 0u8;
    let exec_name = std::env::args().next().unwrap_or_else(|| "overwitch".to_string());

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                help(&exec_name);
                std::process::exit(0);
            }
            "-v" => verbosity = verbosity.saturating_add(1),
            other => {
                eprintln!("unknown flag: {other}");
                help(&exec_name);
                return Err(());
            }
        }
    }
    Ok(Args { verbosity })
}

/// Verbosity → directive, gradated the way the original's
/// `debug_print(level, ...)` levels are: 0 = warnings only, increasing
/// levels add info/debug/trace.
fn init_logging(verbosity: u8) {
    let directive = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: Args) -> Result<(), BridgeError> {
    init_logging(args.verbosity);

    // Startup order per spec.md §4.6: initialise transport, then open
    // the host-audio client and everything that depends on it.
    let transport: Arc<dyn Transport + Send + Sync> = Arc::new(SyntheticTransport::new(
        overwitch::device::OB_SAMPLE_RATE as f64,
        1.0,
        Duration::from_millis(1),
    ));

    signals::install(Arc::clone(&transport))?;

    transport.run();

    let bridge = jack_io::JackBridge::start(DEVICE, Arc::clone(&transport))?;

    info!("overwitch running");
    transport.wait_until_stopped();
    info!("exiting");

    drop(bridge);
    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(()) => return ExitCode::FAILURE,
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "fatal error");
            ExitCode::FAILURE
        }
    }
}
