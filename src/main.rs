mod error;
mod probe;
mod region;
mod report;
mod rss;

use std::io;
use std::process::ExitCode;

use env_logger::Env;
use log::{debug, info};

use crate::error::ProbeError;

fn main() -> ExitCode {
    // Logs go to stderr, the report owns stdout.
    // Example: RUST_LOG=debug ./rssprobe
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    info!("Starting residency probe, {} MiB region", probe::REGION_SIZE >> 20);
    match probe::run(io::stdout().lock()) {
        Ok(outcome) => {
            debug!("Probe finished, immediate reduction: {}", outcome.immediate);
            ExitCode::SUCCESS
        }
        Err(err) => {
            // Printed unconditionally so RUST_LOG cannot hide a failure.
            eprintln!("{:#}", err);
            let code = err.downcast_ref::<ProbeError>().map_or(1, ProbeError::exit_code);
            ExitCode::from(code)
        }
    }
}
