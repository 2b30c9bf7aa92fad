//! Yes/no questions.

use console::Term;
use dialoguer::theme::SimpleTheme;
use dialoguer::Confirm;
use tracing::debug;

use crate::error::{CheckerError, Result};

/// A yes/no question, keyed so tests can script the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub key: String,
    pub text: String,
    /// Used when nobody can answer.
    pub default: bool,
}

impl Question {
    pub fn new(key: impl Into<String>, text: impl Into<String>, default: bool) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            default,
        }
    }
}

/// Ask `question` on `term`.
///
/// Without a terminal to read from, the default answer is returned.
pub fn ask(question: &Question, term: &Term) -> Result<bool> {
    if !term.is_term() {
        debug!(key = %question.key, answer = question.default, "No terminal, using default answer");
        return Ok(question.default);
    }
    Confirm::with_theme(&SimpleTheme)
        .with_prompt(&question.text)
        .default(question.default)
        .interact_on(term)
        .map_err(|e| CheckerError::Io(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_keeps_its_default() {
        let question = Question::new("expectation-mismatch", "Continue the run?", false);
        assert_eq!(question.key, "expectation-mismatch");
        assert!(!question.default);
    }
}
