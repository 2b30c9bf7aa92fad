//! Status lines on stderr.

use console::Term;

use crate::error::Result;

use super::{ask, OutputMode, Palette, Question, Tone, UserInterface};

pub struct TerminalUI {
    term: Term,
    palette: Palette,
    mode: OutputMode,
}

impl TerminalUI {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            term: Term::stderr(),
            palette: Palette::detect(),
            mode,
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn say(&mut self, tone: Tone, text: &str) {
        if !self.mode.allows(tone) {
            return;
        }
        let line = self.palette.paint(tone, text);
        let written = match tone {
            Tone::Banner => self.term.write_line(&format!("\n{line}\n")),
            _ => self.term.write_line(&line),
        };
        if let Err(err) = written {
            tracing::debug!(%err, "Could not write status line");
        }
    }

    fn confirm(&mut self, question: &Question) -> Result<bool> {
        ask(question, &self.term)
    }

    fn is_interactive(&self) -> bool {
        self.term.is_term()
    }
}

pub fn create_ui(mode: OutputMode) -> Box<dyn UserInterface> {
    Box::new(TerminalUI::new(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_ui_keeps_the_mode() {
        assert_eq!(create_ui(OutputMode::Quiet).output_mode(), OutputMode::Quiet);
    }
}
