//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::Parser;
use std::path::PathBuf;

use crate::checker::DebugMode;
use crate::config::schema::delay_from_secs;
use crate::config::ServerSelection;
use crate::ui::OutputMode;

/// Check a CalDAV server and report which features it supports.
#[derive(Debug, Default, Parser)]
#[command(name = "caldav-server-tester")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server entry from the servers file
    #[arg(long)]
    pub name: Option<String>,

    /// Path to the servers file
    #[arg(short, long, env = "CALDAV_SERVER_TESTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// CalDAV URL (overrides the server entry)
    #[arg(long)]
    pub caldav_url: Option<String>,

    /// CalDAV username
    #[arg(long)]
    pub caldav_username: Option<String>,

    /// CalDAV password
    #[arg(long, env = "CALDAV_PASSWORD", hide_env_values = true)]
    pub caldav_password: Option<String>,

    /// Feature profile describing what the server should support
    #[arg(long, value_name = "PROFILE")]
    pub caldav_features: Option<String>,

    /// Run only these checks (and what they depend on)
    #[arg(long = "run-checks", value_name = "CHECK", value_delimiter = ',')]
    pub run_checks: Vec<String>,

    /// Report every recorded feature, the checks run and any mismatches
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print only the report
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the report as JSON (default)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print the report as text
    #[arg(long)]
    pub text: bool,

    /// What to do when a result differs from the feature profile: off, logging, assert, debugger
    #[arg(long, default_value = "logging", value_name = "MODE")]
    pub debug_mode: DebugMode,

    /// Seconds to wait for servers that apply changes lazily
    #[arg(long, default_value_t = 10.0, value_name = "SECONDS", value_parser = parse_delay)]
    pub settle_delay: f64,

    /// Seconds to pause before each request
    #[arg(long, value_name = "SECONDS", value_parser = parse_delay)]
    pub request_delay: Option<f64>,

    /// Extra seconds to pause before each search
    #[arg(long, value_name = "SECONDS", value_parser = parse_delay)]
    pub search_delay: Option<f64>,

    /// Remove test data even if the feature profile says to keep it
    #[arg(long)]
    pub force_cleanup: bool,

    /// List the available checks and exit
    #[arg(long)]
    pub list_checks: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_flags(self.verbose, self.quiet)
    }

    /// Server selection flags.
    pub fn selection(&self) -> ServerSelection {
        ServerSelection {
            name: self.name.clone(),
            url: self.caldav_url.clone(),
            username: self.caldav_username.clone(),
            password: self.caldav_password.clone(),
            features: self.caldav_features.clone(),
            request_delay: self.request_delay,
            search_delay: self.search_delay,
        }
    }
}

/// Seconds that fit a `Duration`.
fn parse_delay(value: &str) -> Result<f64, String> {
    let seconds: f64 = value.parse().map_err(|e| format!("{e}"))?;
    match delay_from_secs(seconds) {
        Some(_) => Ok(seconds),
        None => Err(format!("invalid-delay: {value} is not a usable number of seconds")),
    }
}
