//! Command-line entry point.

use std::process::ExitCode;

use caldav_server_tester::cli::{dispatch, Cli};
use caldav_server_tester::ui::create_ui;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `--debug` beats `RUST_LOG`, which beats the `info` default.
fn log_filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("caldav_server_tester=debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("caldav_server_tester=info"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout belongs to the report
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(cli.debug))
        .init();
    debug!(server = ?cli.name, url = ?cli.caldav_url, checks = ?cli.run_checks, "Starting");

    let mut ui = create_ui(cli.output_mode());
    match dispatch(&cli, ui.as_mut()) {
        Ok(result) => result.into(),
        Err(err) => {
            ui.error(&format!("Error: {err}"));
            ExitCode::FAILURE
        }
    }
}
