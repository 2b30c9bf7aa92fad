//! The probing run.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::caldav::{throttle, DavClient, HttpDavClient};
use crate::checker::{DebugMode, QuirkChecker};
use crate::cli::args::Cli;
use crate::config::schema::seconds;
use crate::config::{self, ResolvedServer, ServerSelection, ServersFile};
use crate::error::{CheckerError, Result};
use crate::report::{ReportFormat, ReportOutput};
use crate::ui::{create_ui, OutputMode, UserInterface};

use super::{Command, CommandResult};

/// Builds the client for a resolved server.
pub type ClientFactory = Box<dyn Fn(&ResolvedServer) -> Result<Box<dyn DavClient>>>;

/// Options for a run.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub config: Option<PathBuf>,
    pub selection: ServerSelection,
    /// Checks to run; empty means all of them.
    pub run_checks: Vec<String>,
    pub output_mode: OutputMode,
    pub format: ReportFormat,
    pub debug_mode: DebugMode,
    pub settle_delay: Duration,
    pub force_cleanup: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            config: None,
            selection: ServerSelection::default(),
            run_checks: Vec::new(),
            output_mode: OutputMode::Normal,
            format: ReportFormat::Json,
            debug_mode: DebugMode::Logging,
            settle_delay: crate::checker::DEFAULT_SETTLE_DELAY,
            force_cleanup: false,
        }
    }
}

/// Checks one server and prints the report.
pub struct CheckCommand {
    options: CheckOptions,
    client_factory: ClientFactory,
}

fn http_client(server: &ResolvedServer) -> Result<Box<dyn DavClient>> {
    let pacing = throttle::from_delays(server.request_delay, server.search_delay);
    let client = HttpDavClient::new(server.client_config(), server.features.clone(), pacing)?;
    Ok(Box::new(client))
}

impl CheckCommand {
    pub fn new(options: CheckOptions) -> Self {
        Self {
            options,
            client_factory: Box::new(http_client),
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        Self::new(CheckOptions {
            config: cli.config.clone(),
            selection: cli.selection(),
            run_checks: cli.run_checks.clone(),
            output_mode: cli.output_mode(),
            format: if cli.text { ReportFormat::Text } else { ReportFormat::Json },
            debug_mode: cli.debug_mode,
            settle_delay: seconds(Some(cli.settle_delay)),
            force_cleanup: cli.force_cleanup,
        })
    }

    /// Use something other than the HTTP client.
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.client_factory = factory;
        self
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// The servers file, or an empty one when none exists at the default location.
    fn servers_file(&self) -> Result<ServersFile> {
        let explicit = self.options.config.is_some() || std::env::var_os(config::CONFIG_ENV).is_some();
        let Some(path) = config::config_path(self.options.config.as_deref()) else {
            return Ok(ServersFile::default());
        };
        match config::load_servers_file(&path) {
            Err(CheckerError::ConfigNotFound { .. }) if !explicit => {
                debug!(path = %path.display(), "No servers file");
                Ok(ServersFile::default())
            }
            other => other,
        }
    }

    /// Check the server and render the report, without printing it.
    pub fn run(&self, ui: &mut dyn UserInterface) -> Result<ReportOutput> {
        ui.warning("This tool is not production-ready: results may be incomplete or wrong");

        let file = self.servers_file()?;
        let server = config::resolve_server(&file, &self.options.selection)?;
        ui.show_header(&format!("{} ({})", server.name, server.url));

        let client = (self.client_factory)(&server)?;
        let mut checker = QuirkChecker::new(client)
            .with_debug_mode(self.options.debug_mode)
            .with_settle_delay(self.options.settle_delay);
        if self.options.debug_mode == DebugMode::Debugger {
            checker = checker.with_ui(create_ui(self.options.output_mode));
        }

        if self.options.run_checks.is_empty() {
            checker.check_all()?;
        } else {
            for name in &self.options.run_checks {
                checker.check_one(name)?;
            }
        }
        info!(checks = checker.checks_run().len(), "Probing finished");

        checker.cleanup(self.options.force_cleanup)?;

        let report = checker.report(self.options.output_mode.is_verbose(), self.options.format)?;
        ui.success(&format!("Ran {} checks against {}", checker.checks_run().len(), server.name));
        Ok(report)
    }
}

impl Command for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let report = self.run(ui)?;
        println!("{}", report.to_text()?);
        Ok(CommandResult::success())
    }
}
