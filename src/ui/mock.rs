//! A [`UserInterface`] that records instead of printing.
//!
//! ```
//! use caldav_server_tester::ui::{MockUI, Question, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.answer("expectation-mismatch", true);
//!
//! let question = Question::new("expectation-mismatch", "Continue the run?", false);
//! assert!(ui.confirm(&question).unwrap());
//! assert!(!ui.confirm(&question).unwrap());
//! assert_eq!(ui.asked(), &["expectation-mismatch", "expectation-mismatch"]);
//! ```

use std::collections::{HashMap, VecDeque};

use crate::error::Result;

use super::{OutputMode, Question, Tone, UserInterface};

#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    said: Vec<(Tone, String)>,
    answers: HashMap<String, VecDeque<bool>>,
    asked: Vec<String>,
}

impl MockUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Script the next answer to `key`.
    ///
    /// Answers are used in the order given; after that the question's
    /// default applies.
    pub fn answer(&mut self, key: &str, yes: bool) {
        self.answers.entry(key.to_string()).or_default().push_back(yes);
    }

    /// Recorded lines of one tone, oldest first.
    pub fn lines(&self, tone: Tone) -> Vec<&str> {
        self.said
            .iter()
            .filter(|(t, _)| *t == tone)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub fn said(&self, tone: Tone, needle: &str) -> bool {
        self.lines(tone).iter().any(|line| line.contains(needle))
    }

    pub fn has_warning(&self, needle: &str) -> bool {
        self.said(Tone::Caution, needle)
    }

    pub fn has_error(&self, needle: &str) -> bool {
        self.said(Tone::Failure, needle)
    }

    /// Keys of the questions asked so far.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn say(&mut self, tone: Tone, text: &str) {
        self.said.push((tone, text.to_string()));
    }

    fn confirm(&mut self, question: &Question) -> Result<bool> {
        self.asked.push(question.key.clone());
        let scripted = self
            .answers
            .get_mut(&question.key)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or(question.default))
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}
