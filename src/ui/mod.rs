//! Status lines and the mismatch question.
//!
//! Everything in here writes to stderr. Only the report goes to stdout,
//! so `caldav-server-tester > report.json` captures nothing else.
//!
//! ```
//! use caldav_server_tester::ui::{MockUI, Tone, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.warning("This tool is not production-ready");
//! assert!(ui.said(Tone::Caution, "production-ready"));
//! ```

pub mod mock;
pub mod output;
pub mod prompts;
pub mod terminal;
pub mod theme;

pub use mock::MockUI;
pub use output::OutputMode;
pub use prompts::{ask, Question};
pub use terminal::{create_ui, TerminalUI};
pub use theme::{colors_enabled, Palette};

use crate::error::Result;

/// How a status line reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Plain,
    Good,
    Caution,
    Failure,
    /// The server banner printed before the checks start.
    Banner,
}

/// Where a run reports progress and asks questions.
///
/// Implementors provide [`say`](UserInterface::say) and
/// [`confirm`](UserInterface::confirm); the tone helpers forward to `say`.
pub trait UserInterface {
    fn output_mode(&self) -> OutputMode;

    /// Write one status line.
    fn say(&mut self, tone: Tone, text: &str);

    /// Ask a yes/no question.
    fn confirm(&mut self, question: &Question) -> Result<bool>;

    fn is_interactive(&self) -> bool;

    fn message(&mut self, text: &str) {
        self.say(Tone::Plain, text);
    }

    fn success(&mut self, text: &str) {
        self.say(Tone::Good, text);
    }

    fn warning(&mut self, text: &str) {
        self.say(Tone::Caution, text);
    }

    fn error(&mut self, text: &str) {
        self.say(Tone::Failure, text);
    }

    fn show_header(&mut self, title: &str) {
        self.say(Tone::Banner, title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_helpers_route_through_say() {
        let mut ui = MockUI::new();
        ui.message("probing");
        ui.success("done");
        ui.error("boom");
        ui.show_header("radicale");

        assert_eq!(ui.lines(Tone::Plain), vec!["probing"]);
        assert_eq!(ui.lines(Tone::Good), vec!["done"]);
        assert_eq!(ui.lines(Tone::Failure), vec!["boom"]);
        assert_eq!(ui.lines(Tone::Banner), vec!["radicale"]);
        assert!(ui.lines(Tone::Caution).is_empty());
    }
}
