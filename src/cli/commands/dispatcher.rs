//! The [`Command`] seam and argument routing.

use std::process::ExitCode;

use tracing::debug;

use crate::cli::args::Cli;
use crate::error::Result;
use crate::ui::UserInterface;

use super::{CheckCommand, ListChecksCommand};

/// Something the binary can run.
pub trait Command {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Exit status a finished command asks for.
///
/// Errors are not represented here; they travel as `Err` and the binary
/// maps them to exit status 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: u8,
}

impl CommandResult {
    pub fn success() -> Self {
        Self { exit_code: 0 }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<CommandResult> for ExitCode {
    fn from(result: CommandResult) -> Self {
        ExitCode::from(result.exit_code)
    }
}

/// Pick the command for `cli` and run it.
pub fn dispatch(cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
    let command: Box<dyn Command> = if cli.list_checks {
        Box::new(ListChecksCommand::new())
    } else {
        Box::new(CheckCommand::from_cli(cli))
    };
    debug!(command = command.name(), "Dispatching");
    command.execute(ui)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use clap::Parser;

    #[test]
    fn success_exits_zero() {
        assert!(CommandResult::success().is_success());
        assert!(!CommandResult { exit_code: 3 }.is_success());
    }

    #[test]
    fn list_checks_prints_without_status_lines() {
        let cli = Cli::try_parse_from(["caldav-server-tester", "--list-checks"]).unwrap();
        let mut ui = MockUI::new();
        assert!(dispatch(&cli, &mut ui).unwrap().is_success());
        assert!(ui.asked().is_empty());
        assert!(!ui.has_warning("production-ready"));
    }
}
