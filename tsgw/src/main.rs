//! The tsgw metrics gateway.
//!
//! Reads plaintext metrics and republishes them to Kafka, sending compact points for series
//! that were described recently. See `tsgw --help` for the available commands.

mod cli;
mod cliapp;
mod lines;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Runs the command line application and exits with its status.
pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            tsgw_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
